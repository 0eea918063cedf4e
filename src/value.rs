//! Representation of runtime values.

extern crate static_assertions as sa;

/// A runtime value.
///
/// Every value that source text can produce is a [Value::Number]. The enum leaves room for more
/// variants without touching the instruction format, since bytecode only ever refers to values by
/// their index in a [ValueArray].
///
/// You can create a value from its equivalent Rust type:
///
/// ```
/// # use lox_arith::value::Value;
/// let float: f64 = 0.5;
/// let v: Value = float.into();
/// assert_eq!("0.5", v.to_string());
/// ```
///
/// This even works with `Option<T>`: `None` turns into [Value::Nil].
///
/// ```
/// # use lox_arith::value::Value;
/// let option = Some(-2.0);
/// let v: Value = option.into();
/// assert_eq!("-2", v.to_string());
///
/// let option: Option<f64> = None;
/// let v: Value = option.into();
/// assert_eq!("nil", v.to_string());
/// ```
#[derive(Debug, Default, Copy, Clone)]
pub enum Value {
    /// The absence of a value. Source text never produces it; embedders may put it in a chunk.
    #[default]
    Nil,
    /// All numbers are 64-bit floating point.
    Number(f64),
}

// Values are copied on and off the stack constantly; keep them two words wide.
sa::const_assert!(std::mem::size_of::<Value>() <= 16);

/// A collection of values. Used as the constant pool of a chunk.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ValueArray {
    values: Vec<Value>,
}

///////////////////////////////////////// Implementation //////////////////////////////////////////

impl Value {
    /// Returns true if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns true if this value is a number.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Returns the number, if this value is one.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Number(num) => Some(num),
            Value::Nil => None,
        }
    }

    /// Returns true if this value is "falsy": nil, or a number equal to zero.
    ///
    /// ```
    /// # use lox_arith::value::Value;
    /// assert!(Value::Nil.is_falsy());
    /// assert!(Value::from(0.0).is_falsy());
    /// assert!(Value::from(-0.0).is_falsy());
    /// assert!(!Value::from(f64::NAN).is_falsy());
    /// assert!(!Value::from(0.25).is_falsy());
    /// ```
    pub fn is_falsy(&self) -> bool {
        match *self {
            Value::Nil => true,
            Value::Number(num) => num == 0.0,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(num) => write!(f, "{num}"),
        }
    }
}

impl std::cmp::PartialEq for Value {
    fn eq(&self, rhs: &Value) -> bool {
        use Value::*;
        match (self, rhs) {
            (Nil, Nil) => true,
            (Number(a), Number(b)) => compare_with_nans_eq(*a, *b),
            _ => false,
        }
    }
}

/// Compares floats, but, unlike IEEE 754, NaNs are considered equal.
fn compare_with_nans_eq(a: f64, b: f64) -> bool {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a == b,
        (true, true) => true,
        _ => false,
    }
}

// Convert any Rust float into a value.
impl From<f64> for Value {
    #[inline(always)]
    fn from(float: f64) -> Value {
        Value::Number(float)
    }
}

// Convert any Rust option into a value.
impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    #[inline]
    fn from(option: Option<T>) -> Value {
        option.map(Into::into).unwrap_or(Value::Nil)
    }
}

impl ValueArray {
    /// Return an empty [ValueArray].
    pub fn new() -> Self {
        ValueArray::default()
    }

    /// Returns a [Value] at the given index. If the index is out of bounds, this returns `None`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.get(index).copied()
    }

    /// Add a new [Value] to the array, returning its index.
    pub fn write(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    /// Iterate over the values, in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Returns how many values are in the pool.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nans_compare_equal() {
        // Constant pools are compared for equality, so NaN must not break reflexivity.
        let nan: Value = f64::NAN.into();
        assert_eq!(nan, nan);
        assert_ne!(nan, Value::from(0.0));
        assert_ne!(Value::Nil, Value::from(0.0));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
    }

    #[test]
    fn only_numbers_are_numbers() {
        assert_eq!(Some(1.5), Value::from(1.5).as_number());
        assert_eq!(None, Value::Nil.as_number());
        assert!(Value::default().is_nil());
        assert!(Value::from(3.0).is_number());
    }

    #[test]
    fn value_array_indices() {
        let mut pool = ValueArray::new();
        assert!(pool.is_empty());
        assert_eq!(0, pool.write(1.0.into()));
        assert_eq!(1, pool.write(Value::Nil));
        assert_eq!(2, pool.len());
        assert_eq!(Some(Value::Number(1.0)), pool.get(0));
        assert_eq!(None, pool.get(2));
    }
}
