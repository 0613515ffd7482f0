//! Creation-time configuration.
//!
//! [`Options`] is an ordered list of named, typed values. A pool reads the
//! options it understands through an [`OptionsReader`], hands the reader to
//! the environment family, and finally calls [`OptionsReader::finish`]: any
//! option nobody consumed is an error.

use space::Dtype;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unrecognized option `{0}`")]
    Unrecognized(String),
    #[error("option `{0}` given twice")]
    Duplicate(String),
    #[error("option `{name}` must be {expected}, got {found}")]
    WrongDtype {
        name: String,
        expected: Dtype,
        found: Dtype,
    },
    #[error("option `{name}` needs {expected} values, got {found}")]
    WrongCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("option `{name}` {reason}")]
    Invalid { name: String, reason: &'static str },
    #[error("options `{first}` and `{second}` are mutually exclusive")]
    Conflict { first: String, second: String },
    #[error("one of {0} is required")]
    Missing(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    U8(Vec<u8>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl OptionValue {
    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            OptionValue::U8(_) => Dtype::Uint8,
            OptionValue::I32(_) => Dtype::Int32,
            OptionValue::F32(_) => Dtype::Float32,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            OptionValue::U8(v) => v.len(),
            OptionValue::I32(v) => v.len(),
            OptionValue::F32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    items: Vec<(String, OptionValue)>,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Options::insert`].
    ///
    /// # Errors
    ///
    /// [`OptionsError::Duplicate`] if `name` is already present.
    pub fn with(mut self, name: impl Into<String>, value: OptionValue) -> Result<Self, OptionsError> {
        self.insert(name, value)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`OptionsError::Duplicate`] if `name` is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) -> Result<(), OptionsError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(OptionsError::Duplicate(name));
        }
        self.items.push((name, value));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.items.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Tracks which options have been consumed.
pub struct OptionsReader<'a> {
    options: &'a Options,
    consumed: Vec<bool>,
}

impl<'a> OptionsReader<'a> {
    #[must_use]
    pub fn new(options: &'a Options) -> Self {
        Self {
            options,
            consumed: vec![false; options.len()],
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.options.get(name).is_some()
    }

    /// Marks `name` consumed and returns its value.
    pub fn take(&mut self, name: &str) -> Option<&'a OptionValue> {
        let options = self.options;
        let index = options.items.iter().position(|(n, _)| n == name)?;
        self.consumed[index] = true;
        Some(&options.items[index].1)
    }

    /// A single `int32` value.
    ///
    /// # Errors
    ///
    /// [`OptionsError::WrongDtype`] or [`OptionsError::WrongCount`] if the
    /// option exists but is not exactly one `int32`.
    pub fn i32(&mut self, name: &str) -> Result<Option<i32>, OptionsError> {
        match self.i32_values(name, 1)? {
            Some(values) => Ok(Some(values[0])),
            None => Ok(None),
        }
    }

    /// One `int32` value per instance.
    ///
    /// # Errors
    ///
    /// As [`OptionsReader::i32`], with `num_envs` as the required count.
    pub fn i32_per_instance(&mut self, name: &str, num_envs: usize) -> Result<Option<&'a [i32]>, OptionsError> {
        self.i32_values(name, num_envs)
    }

    fn i32_values(&mut self, name: &str, expected: usize) -> Result<Option<&'a [i32]>, OptionsError> {
        let Some(value) = self.take(name) else {
            return Ok(None);
        };
        let OptionValue::I32(values) = value else {
            return Err(OptionsError::WrongDtype {
                name: name.to_owned(),
                expected: Dtype::Int32,
                found: value.dtype(),
            });
        };
        if values.len() != expected {
            return Err(OptionsError::WrongCount {
                name: name.to_owned(),
                expected,
                found: values.len(),
            });
        }
        Ok(Some(values.as_slice()))
    }

    /// Fails on the first option nobody consumed.
    ///
    /// # Errors
    ///
    /// [`OptionsError::Unrecognized`] naming that option.
    pub fn finish(self) -> Result<(), OptionsError> {
        match self.consumed.iter().position(|used| !used) {
            Some(index) => Err(OptionsError::Unrecognized(self.options.items[index].0.clone())),
            None => Ok(()),
        }
    }
}
