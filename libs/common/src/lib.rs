pub mod clock;
pub mod color;
pub mod id;

pub use clock::now_ms;
pub use color::is_hex_color;
pub use id::session_token;
