pub use self::interning::InternedString;

pub mod interning;
