/*
SPDX-License-Identifier: Apache-2.0 OR MIT

Copyright 2026 The Selclip contributors

The project to which this file belongs is licensed under either of
the Apache 2.0 or the MIT license at the licensee's choice. The terms
and conditions of the chosen license apply to this file.
*/

#[cfg(feature = "image-data")]
use std::borrow::Cow;

/// The outcome of a failed clipboard operation.
///
/// "No data" and "the operation failed" are deliberately separate: an empty
/// or refusing clipboard owner surfaces as [`Error::ContentNotAvailable`],
/// while transport problems and unresponsive peers surface as their own
/// variants.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
	/// The clipboard contents were not available in the requested format.
	/// This could either be due to the clipboard being empty, having no
	/// owner, or the clipboard contents having an incompatible format to
	/// the requested one (eg when calling `get_image` on text).
	ContentNotAvailable,

	/// The selection-ownership assertion was not confirmed by the display
	/// server, most likely because another process (re)claimed the
	/// clipboard at the same moment.
	ClipboardOccupied,

	/// This can happen in either of the following cases.
	/// 1, When returned from `set_image`: the image going to the clipboard cannot be converted to the appropriate format.
	/// 2, When returned from `get_image`: the image coming from the clipboard could not be converted into the `ImageData` struct.
	/// 3, When returned from `get_text`: the text coming from the clipboard is not valid utf-8 or cannot be converted to utf-8.
	ConversionFailure,

	/// The clipboard is not accessible on the current platform.
	ClipboardNotSupported,

	/// The clipboard owner (or requestor) did not complete the protocol
	/// exchange within the configured timeout.
	///
	/// See [`Clipboard::with_timeout`](crate::Clipboard::with_timeout).
	Timeout,

	Unknown { description: String },
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::ContentNotAvailable => {
				f.write_str("The clipboard contents were not available in the requested format or the clipboard is empty.")
			}
			Error::ClipboardOccupied => {
				f.write_str("The ownership claim was not confirmed; the clipboard is held by another party.")
			}
			Error::ConversionFailure => {
				f.write_str("The data could not be converted between the requested formats.")
			}
			Error::ClipboardNotSupported => {
				f.write_str("The clipboard is not supported on the current platform.")
			}
			Error::Timeout => {
				f.write_str("The clipboard peer did not respond within the configured timeout.")
			}
			Error::Unknown { description } => {
				write!(f, "Unknown error while interacting with the clipboard: {description}")
			}
		}
	}
}

impl std::error::Error for Error {}

/// A logical clipboard data format, as exposed by
/// [`Clipboard::is_format_available`](crate::Clipboard::is_format_available).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
	/// Text encoded as UTF-8 (the `UTF8_STRING` target).
	TextUtf8,
	/// Text encoded as UTF-16 (the `UTF16_STRING` target). Rarely offered
	/// by X11 clipboard owners.
	TextUtf16,
	/// A PNG encoded image (the `image/png` target).
	ImagePng,
	/// A format this library does not know about; always reported as
	/// unavailable.
	Unknown,
}

/// Stores pixel data of an image.
///
/// Each element in `bytes` stores the value of a channel of a single pixel.
/// This struct stores four channels (red, green, blue, alpha) so
/// a 3*3 image is going to be stored on 3*3*4 = 36 bytes of data.
///
/// The pixels are in row-major order meaning that the second pixel
/// in `bytes` (starting at the fifth byte) corresponds to the pixel that's
/// sitting to the right side of the top-left pixel (x=1, y=0)
///
/// Assigning a 2*1 image would for example look like this
/// ```
/// use selclip::ImageData;
/// use std::borrow::Cow;
/// let bytes = [
///     // A red pixel
///     255, 0, 0, 255,
///
///     // A green pixel
///     0, 255, 0, 255,
/// ];
/// let img = ImageData {
///     width: 2,
///     height: 1,
///     bytes: Cow::from(bytes.as_ref())
/// };
/// ```
#[cfg(feature = "image-data")]
#[derive(Debug, Clone)]
pub struct ImageData<'a> {
	pub width: usize,
	pub height: usize,
	pub bytes: Cow<'a, [u8]>,
}

#[cfg(feature = "image-data")]
impl<'a> ImageData<'a> {
	pub fn into_owned_bytes(self) -> Cow<'static, [u8]> {
		self.bytes.into_owned().into()
	}

	/// Returns a new image data that is guaranteed to own its bytes.
	/// In contrast the `clone()` function will yield borrowed bytes if the
	/// original was borrowed too.
	pub fn to_cloned(&self) -> ImageData<'static> {
		ImageData {
			width: self.width,
			height: self.height,
			bytes: self.bytes.clone().into_owned().into(),
		}
	}
}

/// Runs the given callback when dropped.
pub(crate) struct ScopeGuard<F: FnOnce()> {
	callback: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
	#[must_use]
	pub(crate) fn new(callback: F) -> Self {
		ScopeGuard { callback: Some(callback) }
	}
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
	fn drop(&mut self) {
		if let Some(callback) = self.callback.take() {
			(callback)();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scope_guard_runs_on_drop() {
		let mut ran = false;
		{
			let _guard = ScopeGuard::new(|| ran = true);
		}
		assert!(ran);
	}

	#[test]
	fn error_messages_are_not_empty() {
		let errors = [
			Error::ContentNotAvailable,
			Error::ClipboardOccupied,
			Error::ConversionFailure,
			Error::ClipboardNotSupported,
			Error::Timeout,
			Error::Unknown { description: "test".into() },
		];
		for error in errors {
			assert!(!error.to_string().is_empty());
		}
	}

	#[cfg(feature = "image-data")]
	#[test]
	fn image_data_to_cloned_owns_bytes() {
		let bytes = [255u8, 0, 0, 255];
		let img = ImageData { width: 1, height: 1, bytes: Cow::from(bytes.as_ref()) };
		let cloned = img.to_cloned();
		assert!(matches!(cloned.bytes, Cow::Owned(_)));
		assert_eq!(&*cloned.bytes, &bytes);
	}
}
