//! Primary-key generation at insert time.

use uuid::Uuid;

use crate::error::BoxError;
use crate::schema::Field;
use crate::value::Value;

/// Produces primary-key values for new rows.
///
/// Implemented for closures, so a one-off generator can be written inline:
///
/// ```
/// use relq::keygen::KeyGenerator;
/// use relq::value::Value;
///
/// let next = |_field: &relq::schema::Field| -> Result<Value, relq::error::BoxError> {
///     Ok(Value::Int(7))
/// };
/// # let _: &dyn KeyGenerator = &next;
/// ```
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, field: &Field) -> Result<Value, BoxError>;
}

impl<F> KeyGenerator for F
where
    F: Fn(&Field) -> Result<Value, BoxError> + Send + Sync,
{
    fn generate(&self, field: &Field) -> Result<Value, BoxError> {
        self(field)
    }
}

/// Random UUID keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4;

impl KeyGenerator for UuidV4 {
    fn generate(&self, _field: &Field) -> Result<Value, BoxError> {
        Ok(Value::Uuid(Uuid::new_v4()))
    }
}

/// Time-ordered UUID keys; later rows sort after earlier ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7;

impl KeyGenerator for UuidV7 {
    fn generate(&self, _field: &Field) -> Result<Value, BoxError> {
        Ok(Value::Uuid(Uuid::now_v7()))
    }
}
