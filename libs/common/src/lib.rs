pub mod cursor;
pub mod id;

pub use cursor::CursorGenerator;
