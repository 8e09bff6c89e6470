/*
SPDX-License-Identifier: Apache-2.0 OR MIT

Copyright 2026 The Selclip contributors

The project to which this file belongs is licensed under either of
the Apache 2.0 or the MIT license at the licensee's choice. The terms
and conditions of the chosen license apply to this file.
*/

#[cfg(all(unix, not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))))]
mod x11;
#[cfg(all(
	unix,
	not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
))]
pub(crate) use x11::Clipboard;

#[cfg(not(all(
	unix,
	not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
)))]
mod dummy;
#[cfg(not(all(
	unix,
	not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
)))]
pub(crate) use dummy::Clipboard;

#[cfg(all(unix, not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))))]
fn into_unknown<E: std::fmt::Display>(error: E) -> crate::Error {
	crate::Error::Unknown { description: format!("{error}") }
}

#[cfg(all(
	unix,
	not(any(target_os = "macos", target_os = "android", target_os = "emscripten")),
	feature = "image-data"
))]
fn encode_as_png(image: &crate::ImageData) -> Result<Vec<u8>, crate::Error> {
	use image::ImageEncoder as _;

	if image.bytes.is_empty() || image.width == 0 || image.height == 0 {
		return Err(crate::Error::ConversionFailure);
	}

	let mut png_bytes = Vec::new();
	let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
	encoder
		.write_image(
			image.bytes.as_ref(),
			image.width as u32,
			image.height as u32,
			image::ExtendedColorType::Rgba8,
		)
		.map_err(|_| crate::Error::ConversionFailure)?;

	Ok(png_bytes)
}
