use crate::error::DriverError;

pub type DriverResult<T> = Result<T, DriverError>;
