pub type Result<T> = core::result::Result<T, crate::Error>;
