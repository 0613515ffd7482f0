use std::ffi::c_void;
use std::slice;

use anyhow::{bail, ensure, Context, Result};
use space::Dtype;
use vecenv::{OptionValue, Options};

use crate::raw::{RawOption, RawOptions};

/// Copies a caller's option array into owned [`Options`].
///
/// A null `raw` means no options.
///
/// # Safety
///
/// If non-null, `raw` must point to a valid [`RawOptions`] whose `items`
/// holds `count` records, each with `data` pointing to `count` values of its
/// dtype.
pub unsafe fn options_from_raw(raw: *const RawOptions) -> Result<Options> {
    let mut options = Options::new();
    let Some(raw) = raw.as_ref() else {
        return Ok(options);
    };
    let count = usize::try_from(raw.count).with_context(|| format!("negative option count {}", raw.count))?;
    if count == 0 {
        return Ok(options);
    }
    ensure!(!raw.items.is_null(), "{count} options but a null item array");

    for (i, item) in slice::from_raw_parts(raw.items, count).iter().enumerate() {
        let name = option_name(item).with_context(|| format!("option {i}"))?;
        let value = option_value(item).with_context(|| format!("option `{name}`"))?;
        options.insert(name, value)?;
    }
    Ok(options)
}

fn option_name(item: &RawOption) -> Result<&str> {
    let end = item
        .name
        .iter()
        .position(|&b| b == 0)
        .context("name is not NUL-terminated")?;
    ensure!(end > 0, "empty name");
    std::str::from_utf8(&item.name[..end]).context("name is not UTF-8")
}

unsafe fn option_value(item: &RawOption) -> Result<OptionValue> {
    let dtype = Dtype::try_from(item.dtype)?;
    let count = usize::try_from(item.count).with_context(|| format!("negative value count {}", item.count))?;
    if count == 0 {
        return Ok(empty(dtype));
    }
    if item.data.is_null() {
        bail!("{count} values but a null data pointer");
    }
    // callers are not required to align option data
    let bytes = slice::from_raw_parts(item.data.cast::<u8>(), count * dtype.size());
    Ok(match dtype {
        Dtype::Uint8 => OptionValue::U8(bytes.to_vec()),
        Dtype::Int32 => OptionValue::I32(bytemuck::pod_collect_to_vec(bytes)),
        Dtype::Float32 => OptionValue::F32(bytemuck::pod_collect_to_vec(bytes)),
    })
}

fn empty(dtype: Dtype) -> OptionValue {
    match dtype {
        Dtype::Uint8 => OptionValue::U8(Vec::new()),
        Dtype::Int32 => OptionValue::I32(Vec::new()),
        Dtype::Float32 => OptionValue::F32(Vec::new()),
    }
}

/// Keeps the backing storage of a [`RawOptions`] alive for Rust callers.
#[derive(Debug, Default)]
pub struct OwnedRawOptions {
    items: Vec<RawOption>,
    data: Vec<Vec<u8>>,
}

impl OwnedRawOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name = values`, stored as `int32`.
    #[must_use]
    pub fn with_i32(mut self, name: &str, values: &[i32]) -> Self {
        let bytes = bytemuck::cast_slice::<i32, u8>(values).to_vec();
        let count = i32::try_from(values.len()).unwrap_or(i32::MAX);
        self.items
            .push(RawOption::new(name, Dtype::Int32.code(), count, bytes.as_ptr().cast::<c_void>()));
        self.data.push(bytes);
        self
    }

    /// A view valid for as long as `self` is neither moved nor dropped.
    #[must_use]
    pub fn as_raw(&self) -> RawOptions {
        RawOptions {
            items: self.items.as_ptr(),
            count: i32::try_from(self.items.len()).unwrap_or(i32::MAX),
        }
    }
}
