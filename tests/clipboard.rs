/*
SPDX-License-Identifier: Apache-2.0 OR MIT

Copyright 2026 The Selclip contributors

The project to which this file belongs is licensed under either of
the Apache 2.0 or the MIT license at the licensee's choice. The terms
and conditions of the chosen license apply to this file.
*/

//! Round-trip tests against a live X server. The clipboard is a global
//! resource, so every test takes a process-wide lock; all of them are
//! skipped when no display is available (e.g. headless CI without Xvfb).

use std::sync::{Mutex, MutexGuard, OnceLock};

use selclip::{Clipboard, Error, Format};

fn lock() -> MutexGuard<'static, ()> {
	static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
	let _ = env_logger::builder().is_test(true).try_init();
	LOCK.get_or_init(|| Mutex::new(()))
		.lock()
		.unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn have_display() -> bool {
	std::env::var_os("DISPLAY").is_some()
}

macro_rules! require_display {
	() => {
		if !have_display() {
			eprintln!("skipping: no DISPLAY available");
			return;
		}
	};
}

/// Set the text, check that UTF-8 text is advertised, read it back.
fn check_text_round_trip(text: &str) {
	let mut clipboard = Clipboard::new().unwrap();
	clipboard.set_text(text).unwrap();
	assert!(clipboard.is_format_available(Format::TextUtf8).unwrap());
	assert_eq!(clipboard.get_text().unwrap(), text);
}

#[test]
fn ascii_text_round_trips() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("all work and no play makes Jack a dull boy");
}

#[test]
fn empty_text_round_trips() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("");
}

#[test]
fn japanese_text_round_trips() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("ユーザー別サイト");
}

#[test]
fn chinese_text_round_trips() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("简体中文");
}

#[test]
fn korean_text_round_trips() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("크로스 플랫폼으로");
}

#[test]
fn math_symbols_round_trip() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("∮ E⋅da = Q, n → ∞, ∑ f(i) = ∏ g(i)");
}

#[test]
fn thai_text_round_trips() {
	require_display!();
	let _guard = lock();
	check_text_round_trip("แผ่นดินฮั่นเสื่อมโทรมแสนสังเวช");
}

#[test]
fn repeated_get_returns_the_same_value() {
	require_display!();
	let _guard = lock();
	let mut clipboard = Clipboard::new().unwrap();
	clipboard.set_text("stable contents").unwrap();
	let first = clipboard.get_text().unwrap();
	let second = clipboard.get_text().unwrap();
	assert_eq!(first, "stable contents");
	assert_eq!(first, second);
}

#[test]
fn newest_set_wins() {
	require_display!();
	let _guard = lock();
	let mut clipboard = Clipboard::new().unwrap();
	clipboard.set_text("the first value").unwrap();
	clipboard.set_text("the second value").unwrap();
	assert_eq!(clipboard.get_text().unwrap(), "the second value");
}

#[test]
fn set_from_two_contexts_newest_wins() {
	require_display!();
	let _guard = lock();
	let mut older = Clipboard::new().unwrap();
	let mut newer = Clipboard::new().unwrap();
	older.set_text("from the older context").unwrap();
	newer.set_text("from the newer context").unwrap();
	assert_eq!(older.get_text().unwrap(), "from the newer context");
}

#[test]
fn large_text_round_trips_incrementally() {
	require_display!();
	let _guard = lock();
	// Larger than the 1 MiB INCR threshold, with a length that is not a
	// multiple of the segment size so the final partial segment and the
	// terminator are both exercised.
	let mut text = "0123456789abcdef".repeat(2 * 1024 * 1024 / 16);
	text.push_str("trailer");
	check_text_round_trip(&text);
}

#[test]
fn dropping_the_owner_leaves_the_clipboard_empty() {
	require_display!();
	let _guard = lock();
	{
		let mut owner = Clipboard::new().unwrap();
		owner.set_text("about to vanish").unwrap();
	}
	// The claim died with the context, so the selection has no owner now.
	let mut clipboard = Clipboard::new().unwrap();
	assert!(matches!(clipboard.get_text(), Err(Error::ContentNotAvailable)));
	assert!(!clipboard.is_format_available(Format::TextUtf8).unwrap());
	assert!(!clipboard.is_format_available(Format::ImagePng).unwrap());
}

#[test]
fn concurrent_reads_of_a_large_value_never_stall() {
	require_display!();
	let _guard = lock();
	let payload = "0123456789abcdef".repeat(2 * 1024 * 1024 / 16);
	let mut owner = Clipboard::new().unwrap();
	owner.set_text(payload.clone()).unwrap();

	let parallel = std::thread::spawn(|| {
		let mut clipboard = Clipboard::new().unwrap();
		clipboard.get_text()
	});
	let mut clipboard = Clipboard::new().unwrap();
	let first = clipboard.get_text();
	let second = parallel.join().unwrap();
	for result in [first, second] {
		match result {
			Ok(text) => assert_eq!(text, payload),
			// A request landing while the other transfer is in flight is
			// refused outright rather than left to time out.
			Err(Error::ContentNotAvailable) => {}
			Err(other) => panic!("a concurrent read failed with: {other}"),
		}
	}
}

#[test]
fn format_availability_reflects_contents() {
	require_display!();
	let _guard = lock();
	let mut clipboard = Clipboard::new().unwrap();
	clipboard.set_text("just text").unwrap();
	assert!(clipboard.is_format_available(Format::TextUtf8).unwrap());
	assert!(!clipboard.is_format_available(Format::ImagePng).unwrap());
	assert!(!clipboard.is_format_available(Format::TextUtf16).unwrap());
}

#[test]
fn unknown_format_is_never_available() {
	require_display!();
	let _guard = lock();
	let mut clipboard = Clipboard::new().unwrap();
	assert!(!clipboard.is_format_available(Format::Unknown).unwrap());
}

#[test]
fn custom_timeout_still_round_trips() {
	require_display!();
	let _guard = lock();
	let mut clipboard =
		Clipboard::with_timeout(std::time::Duration::from_secs(10)).unwrap();
	clipboard.set_text("with a custom timeout").unwrap();
	assert_eq!(clipboard.get_text().unwrap(), "with a custom timeout");
}

#[cfg(feature = "image-data")]
#[test]
fn image_round_trips_as_png() {
	use selclip::ImageData;
	use std::borrow::Cow;

	require_display!();
	let _guard = lock();
	#[rustfmt::skip]
	let bytes: [u8; 16] = [
		255, 0, 0, 255,    0, 255, 0, 255,
		0, 0, 255, 255,    255, 255, 255, 255,
	];
	let image = ImageData { width: 2, height: 2, bytes: Cow::from(bytes.as_ref()) };

	let mut clipboard = Clipboard::new().unwrap();
	clipboard.set_image(image).unwrap();
	assert!(clipboard.is_format_available(Format::ImagePng).unwrap());
	assert!(!clipboard.is_format_available(Format::TextUtf8).unwrap());

	let read_back = clipboard.get_image().unwrap();
	assert_eq!(read_back.width, 2);
	assert_eq!(read_back.height, 2);
	assert_eq!(&*read_back.bytes, &bytes);
}
