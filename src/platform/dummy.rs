/*
SPDX-License-Identifier: Apache-2.0 OR MIT

Copyright 2026 The Selclip contributors

The project to which this file belongs is licensed under either of
the Apache 2.0 or the MIT license at the licensee's choice. The terms
and conditions of the chosen license apply to this file.
*/

use std::borrow::Cow;
use std::time::Duration;

#[cfg(feature = "image-data")]
use crate::ImageData;
use crate::{Error, Format};

/// Placeholder used on platforms without an X11 display server. Every
/// operation reports the clipboard as unsupported or empty.
#[derive(Default, Debug)]
pub(crate) struct Clipboard {}

impl Clipboard {
	pub(crate) fn new(_timeout: Duration) -> Result<Self, Error> {
		Ok(Clipboard::default())
	}

	pub(crate) fn get_text(&self) -> Result<String, Error> {
		Err(Error::ContentNotAvailable)
	}

	pub(crate) fn set_text(&self, _text: Cow<'_, str>) -> Result<(), Error> {
		Err(Error::ClipboardNotSupported)
	}

	pub(crate) fn is_format_available(&self, _format: Format) -> Result<bool, Error> {
		Ok(false)
	}

	#[cfg(feature = "image-data")]
	pub(crate) fn get_image(&self) -> Result<ImageData<'static>, Error> {
		Err(Error::ContentNotAvailable)
	}

	#[cfg(feature = "image-data")]
	pub(crate) fn set_image(&self, _image: ImageData) -> Result<(), Error> {
		Err(Error::ClipboardNotSupported)
	}
}
