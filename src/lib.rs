/*
SPDX-License-Identifier: Apache-2.0 OR MIT

Copyright 2026 The Selclip contributors

The project to which this file belongs is licensed under either of
the Apache 2.0 or the MIT license at the licensee's choice. The terms
and conditions of the chosen license apply to this file.
*/

//! Text and image access to the X11 `CLIPBOARD` selection, without a GUI
//! toolkit.
//!
//! A [`Clipboard`] is an explicit context: it owns a connection to the
//! display server for reading and, while this process holds the clipboard,
//! a background responder that answers other processes' requests. Contexts
//! are independent of each other and relinquish any ownership claim when
//! dropped.
//!
//! All operations are blocking, bounded by a configurable timeout so an
//! unresponsive peer cannot hang the caller forever.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), selclip::Error> {
//! let mut clipboard = selclip::Clipboard::new()?;
//! clipboard.set_text("Hello, clipboard!")?;
//! assert_eq!(clipboard.get_text()?, "Hello, clipboard!");
//! # Ok(())
//! # }
//! ```

mod common;
mod platform;

#[cfg(feature = "image-data")]
pub use common::ImageData;
pub use common::{Error, Format};

use std::borrow::Cow;
use std::time::Duration;

/// A handle to the system clipboard.
///
/// Opening the handle connects to the display server and interns every
/// protocol identifier once; the connection lives until the handle is
/// dropped. Creating multiple independent handles is allowed.
pub struct Clipboard {
	pub(crate) platform: platform::Clipboard,
}

impl Clipboard {
	/// The bound applied to every protocol wait unless
	/// [`with_timeout`](Self::with_timeout) is used. Generous because some
	/// clipboard owners, for example ones producing an image on demand,
	/// take seconds to respond.
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

	/// Creates a handle to the clipboard with the default timeout.
	pub fn new() -> Result<Self, Error> {
		Self::with_timeout(Self::DEFAULT_TIMEOUT)
	}

	/// Creates a handle to the clipboard whose protocol waits give up with
	/// [`Error::Timeout`] after the given duration.
	pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
		Ok(Clipboard { platform: platform::Clipboard::new(timeout)? })
	}

	/// Fetches UTF-8 text from the clipboard and returns it.
	///
	/// An empty or absent clipboard, as well as an owner that cannot
	/// produce text, reports [`Error::ContentNotAvailable`].
	pub fn get_text(&mut self) -> Result<String, Error> {
		self.platform.get_text()
	}

	/// Places the text onto the clipboard. Any valid UTF-8 string is
	/// accepted; the text is copied, so the caller keeps ownership.
	///
	/// The claim is held by a background thread which serves other
	/// processes' requests until something else takes the clipboard over
	/// or this context is dropped. A later `set_text` or `set_image` on
	/// the same context supersedes the claim.
	pub fn set_text<'a, T: Into<Cow<'a, str>>>(&mut self, text: T) -> Result<(), Error> {
		self.platform.set_text(text.into())
	}

	/// Reports whether the current clipboard owner can produce the given
	/// format.
	///
	/// [`Format::Unknown`] is always unavailable and costs no protocol
	/// round trip. A missing owner or one refusing to enumerate its
	/// formats reports `Ok(false)`; transport failures and timeouts are
	/// errors.
	pub fn is_format_available(&mut self, format: Format) -> Result<bool, Error> {
		self.platform.is_format_available(format)
	}

	/// Fetches image data from the clipboard and returns the decoded
	/// RGBA8 pixels.
	///
	/// Only owners offering the `image/png` target can be read from.
	#[cfg(feature = "image-data")]
	pub fn get_image(&mut self) -> Result<ImageData<'static>, Error> {
		self.platform.get_image()
	}

	/// Places an image onto the clipboard, offered to other processes
	/// under the `image/png` target.
	#[cfg(feature = "image-data")]
	pub fn set_image(&mut self, image: ImageData) -> Result<(), Error> {
		self.platform.set_image(image)
	}
}
