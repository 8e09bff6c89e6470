/*
SPDX-License-Identifier: Apache-2.0 OR MIT

Copyright 2026 The Selclip contributors

The project to which this file belongs is licensed under either of
the Apache 2.0 or the MIT license at the licensee's choice. The terms
and conditions of the chosen license apply to this file.
*/

// More info about using the clipboard on X11:
// https://tronche.com/gui/x/icccm/sec-2.html#s-2.6
// https://x.org/releases/X11R7.6/doc/xorg-docs/specs/ICCCM/icccm.html#incr_properties

use std::{
	borrow::Cow,
	sync::{mpsc, Arc},
	thread::{self, JoinHandle},
	time::{Duration, Instant},
};

use log::{error, trace, warn};
use parking_lot::{Condvar, Mutex};
use x11rb::{
	connection::{Connection, RequestConnection as _},
	protocol::{
		xproto::{
			Atom, AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, CreateWindowAux,
			EventMask, PropMode, Property, PropertyNotifyEvent, SelectionNotifyEvent,
			SelectionRequestEvent, Time, WindowClass, SELECTION_NOTIFY_EVENT,
		},
		Event,
	},
	rust_connection::RustConnection,
	wrapper::ConnectionExt as _,
	COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT, NONE,
};

#[cfg(feature = "image-data")]
use super::encode_as_png;
use super::into_unknown;
#[cfg(feature = "image-data")]
use crate::ImageData;
use crate::{common::ScopeGuard, Error, Format};

type Result<T, E = Error> = std::result::Result<T, E>;

x11rb::atom_manager! {
	pub Atoms: AtomCookies {
		CLIPBOARD,
		TARGETS,
		TIMESTAMP,
		INCR,

		UTF8_STRING,
		UTF16_STRING,
		// Text in an unspecified encoding, kept for requestors predating
		// UTF8_STRING. See: https://tronche.com/gui/x/icccm/sec-2.html#s-2.6.2
		TEXT,

		PNG_MIME: b"image/png",

		// This is just some random name for the property on the holding
		// window, into which the clipboard owner writes the data we
		// requested.
		SELCLIP_DATA,
	}
}

/// Upper bound on the number of atoms read back from a TARGETS reply, to
/// avoid unbounded allocation on a hostile owner.
const TARGETS_READ_LIMIT: u32 = 512;

/// Payloads at least this large are streamed to requestors through the
/// INCR mechanism instead of a single property write.
const INCR_THRESHOLD: usize = 1 << 20;

/// Size of a single INCR segment sent to a requestor.
const INCR_CHUNK_SIZE: usize = 64 * 1024;

/// How long to wait for the connection to the X11 socket to be made.
const CONNECT_TIMEOUT_DUR: Duration = Duration::from_millis(1000);

/// A connection to the X server plus an invisible window on it.
///
/// The reading side uses one of these for the process lifetime (the window
/// being the destination of conversion replies); the writing side opens a
/// fresh one per ownership claim (the window being the selection owner).
struct XContext {
	conn: RustConnection,
	win_id: u32,
}

impl XContext {
	fn new() -> Result<Self> {
		// create a new connection to an X11 server
		// with a timeout on connecting to the socket in case of hangage
		let (tx, rx) = mpsc::channel();
		thread::spawn(move || {
			tx.send(RustConnection::connect(None)).ok(); // disregard error sending on channel as main thread has timed out.
		});
		let patient_conn = rx.recv_timeout(CONNECT_TIMEOUT_DUR).map_err(into_unknown)?;
		let (conn, screen_num): (RustConnection, _) = patient_conn.map_err(into_unknown)?;

		let screen = conn
			.setup()
			.roots
			.get(screen_num)
			.ok_or(Error::Unknown { description: String::from("no screen found") })?;
		let win_id = conn.generate_id().map_err(into_unknown)?;

		let event_mask =
            // To receive PropertyNotify events, which drive the INCR
            // handshake on the holding property.
            EventMask::PROPERTY_CHANGE |
            // To receive DestroyNotify and stop the responder loop.
            EventMask::STRUCTURE_NOTIFY;
		// create the window
		conn.create_window(
			// copy as much as possible from the parent, because no other specific input is needed
			COPY_DEPTH_FROM_PARENT,
			win_id,
			screen.root,
			0,
			0,
			1,
			1,
			0,
			WindowClass::COPY_FROM_PARENT,
			COPY_FROM_PARENT,
			// don't subscribe to any special events because we are requesting everything we need ourselves
			&CreateWindowAux::new().event_mask(event_mask),
		)
		.map_err(into_unknown)?;
		conn.flush().map_err(into_unknown)?;

		Ok(Self { conn, win_id })
	}
}

/// One entry of the data served to requestors while this process owns the
/// selection.
#[derive(Debug, Clone)]
struct ClipboardData {
	bytes: Vec<u8>,

	/// The atom representing the format in which the data is encoded.
	format: Atom,
}

/// Everything belonging to a live ownership claim.
struct OwnerHandle {
	/// The secondary connection; the clip window on it exists for exactly
	/// as long as the claim does.
	ctx: Arc<XContext>,

	/// Join handle to the thread which serves selection requests.
	responder: JoinHandle<()>,
}

/// Tracks whether this context currently holds the CLIPBOARD selection.
///
/// The transitional states make overlapping `set` calls serialize
/// deterministically: a thread that finds the state transitional parks on
/// the condvar until the transition settles, so the newest completed claim
/// always wins.
enum ClaimState {
	Idle,
	/// A thread is asserting ownership right now.
	Claiming,
	Owning(OwnerHandle),
	/// A thread is tearing a previous claim down.
	Relinquishing,
}

enum ReadSelNotifyResult {
	GotData(Vec<u8>),
	IncrStarted,
	EventNotRecognized,
}

/// Whether the responder should keep serving after a request was handled.
enum ServeOutcome {
	Continue,
	/// Ownership was lost while the request was being served.
	Stop,
}

pub(crate) struct Clipboard {
	/// The primary connection and the holding window; the sole destination
	/// of conversion replies. Locked for the whole duration of a read so
	/// that concurrent reads cannot interleave on the shared property.
	reader: Mutex<XContext>,
	atoms: Atoms,

	claim: Mutex<ClaimState>,
	claim_done: Condvar,

	/// Bound on every protocol wait, so that an unresponsive peer cannot
	/// hang the caller forever.
	timeout: Duration,
}

impl Clipboard {
	pub(crate) fn new(timeout: Duration) -> Result<Self> {
		let reader = XContext::new()?;
		let atoms =
			Atoms::new(&reader.conn).map_err(into_unknown)?.reply().map_err(into_unknown)?;
		trace!("Created the X11 clipboard context.");
		Ok(Self {
			reader: Mutex::new(reader),
			atoms,
			claim: Mutex::new(ClaimState::Idle),
			claim_done: Condvar::new(),
			timeout,
		})
	}

	pub(crate) fn get_text(&self) -> Result<String> {
		let reader = self.reader.lock();
		let targets = self.read_targets(&reader)?;
		if !targets.contains(&self.atoms.UTF8_STRING) {
			return Err(Error::ContentNotAvailable);
		}
		let bytes = self.read_single(&reader, self.atoms.UTF8_STRING)?;
		String::from_utf8(bytes).map_err(|_| Error::ConversionFailure)
	}

	pub(crate) fn set_text(&self, text: Cow<'_, str>) -> Result<()> {
		let data = vec![ClipboardData {
			bytes: text.into_owned().into_bytes(),
			format: self.atoms.UTF8_STRING,
		}];
		self.set_data(data)
	}

	pub(crate) fn is_format_available(&self, format: Format) -> Result<bool> {
		let target = match format {
			Format::TextUtf8 => self.atoms.UTF8_STRING,
			Format::TextUtf16 => self.atoms.UTF16_STRING,
			Format::ImagePng => self.atoms.PNG_MIME,
			// Not something we can ask the owner about.
			Format::Unknown => return Ok(false),
		};
		let reader = self.reader.lock();
		match self.read_targets(&reader) {
			Ok(targets) => Ok(targets.contains(&target)),
			// No owner, or the owner refused to enumerate.
			Err(Error::ContentNotAvailable) => Ok(false),
			Err(e) => Err(e),
		}
	}

	#[cfg(feature = "image-data")]
	pub(crate) fn get_image(&self) -> Result<ImageData<'static>> {
		let reader = self.reader.lock();
		let targets = self.read_targets(&reader)?;
		if !targets.contains(&self.atoms.PNG_MIME) {
			return Err(Error::ContentNotAvailable);
		}
		let bytes = self.read_single(&reader, self.atoms.PNG_MIME)?;
		drop(reader);

		let image = match image::load_from_memory_with_format(&bytes, image::ImageFormat::Png) {
			Ok(img) => img.into_rgba8(),
			Err(_e) => return Err(Error::ConversionFailure),
		};
		let (w, h) = image.dimensions();
		Ok(ImageData { width: w as usize, height: h as usize, bytes: image.into_raw().into() })
	}

	#[cfg(feature = "image-data")]
	pub(crate) fn set_image(&self, image: ImageData) -> Result<()> {
		let encoded = encode_as_png(&image)?;
		let data = vec![ClipboardData { bytes: encoded, format: self.atoms.PNG_MIME }];
		self.set_data(data)
	}

	/// Asks the current selection owner which targets it can produce.
	fn read_targets(&self, reader: &XContext) -> Result<Vec<Atom>> {
		// Delete the property first so that a stale reply from an earlier
		// request cannot be mistaken for this one.
		reader
			.conn
			.delete_property(reader.win_id, self.atoms.SELCLIP_DATA)
			.map_err(into_unknown)?;
		reader
			.conn
			.convert_selection(
				reader.win_id,
				self.atoms.CLIPBOARD,
				self.atoms.TARGETS,
				self.atoms.SELCLIP_DATA,
				Time::CURRENT_TIME,
			)
			.map_err(into_unknown)?;
		reader.conn.sync().map_err(into_unknown)?;

		let deadline = Instant::now() + self.timeout;
		loop {
			match self.poll_event(reader, deadline)? {
				Event::SelectionNotify(event) if event.target == self.atoms.TARGETS => {
					if event.property == NONE {
						// No owner, or the owner refused the conversion.
						return Err(Error::ContentNotAvailable);
					}
					let reply = reader
						.conn
						.get_property(
							true,
							reader.win_id,
							self.atoms.SELCLIP_DATA,
							AtomEnum::ATOM,
							0,
							TARGETS_READ_LIMIT,
						)
						.map_err(into_unknown)?
						.reply()
						.map_err(into_unknown)?;
					return Ok(reply.value32().map(|iter| iter.collect()).unwrap_or_default());
				}
				_ => trace!("Unrelated event while waiting for the TARGETS reply."),
			}
		}
	}

	/// Requests conversion of the selection to `target_format` and returns
	/// the payload, following the INCR protocol when the owner signals an
	/// oversized transfer. Either the whole payload is returned or an
	/// error is; never partial data.
	fn read_single(&self, reader: &XContext, target_format: Atom) -> Result<Vec<u8>> {
		// Delete the property so that we can detect (using property notify)
		// when the selection owner receives our request.
		reader
			.conn
			.delete_property(reader.win_id, self.atoms.SELCLIP_DATA)
			.map_err(into_unknown)?;

		// request to convert the clipboard selection to our data type
		reader
			.conn
			.convert_selection(
				reader.win_id,
				self.atoms.CLIPBOARD,
				target_format,
				self.atoms.SELCLIP_DATA,
				Time::CURRENT_TIME,
			)
			.map_err(into_unknown)?;
		reader.conn.sync().map_err(into_unknown)?;

		trace!("Finished `convert_selection`");

		let mut incr_data: Vec<u8> = Vec::new();
		let mut using_incr = false;
		let mut deadline = Instant::now() + self.timeout;

		loop {
			match self.poll_event(reader, deadline)? {
				// The first response after requesting a selection.
				Event::SelectionNotify(event) => {
					trace!("Read SelectionNotify");
					let result = self.handle_read_selection_notify(
						reader,
						target_format,
						&mut using_incr,
						&mut incr_data,
						event,
					)?;
					match result {
						ReadSelNotifyResult::GotData(data) => return Ok(data),
						ReadSelNotifyResult::IncrStarted => {
							// The data is going to be sent INCRementally;
							// re-arm the deadline for the first segment.
							deadline = Instant::now() + self.timeout;
						}
						ReadSelNotifyResult::EventNotRecognized => (),
					}
				}
				// If the previous SelectionNotify event specified that the data
				// will be sent in INCR segments, each segment is transferred in
				// a PropertyNotify event.
				Event::PropertyNotify(event) => {
					let done = self.handle_read_property_notify(
						reader,
						target_format,
						using_incr,
						&mut incr_data,
						&mut deadline,
						event,
					)?;
					if done {
						return Ok(incr_data);
					}
				}
				_ => trace!("An unexpected event arrived while reading the clipboard."),
			}
		}
	}

	/// Waits for the next event on the reader connection, failing with
	/// `Error::Timeout` once the deadline passes.
	fn poll_event(&self, reader: &XContext, deadline: Instant) -> Result<Event> {
		while Instant::now() < deadline {
			match reader.conn.poll_for_event().map_err(into_unknown)? {
				Some(event) => return Ok(event),
				None => thread::sleep(Duration::from_millis(1)),
			}
		}
		warn!("Time-out hit while waiting for the selection owner.");
		Err(Error::Timeout)
	}

	fn handle_read_selection_notify(
		&self,
		reader: &XContext,
		target_format: Atom,
		using_incr: &mut bool,
		incr_data: &mut Vec<u8>,
		event: SelectionNotifyEvent,
	) -> Result<ReadSelNotifyResult> {
		// The property being set to NONE means that the `convert_selection`
		// failed.

		// According to: https://tronche.com/gui/x/icccm/sec-2.html#s-2.4
		// the target must be set to the same as what we requested.
		if event.property == NONE || event.target != target_format {
			return Err(Error::ContentNotAvailable);
		}
		if *using_incr {
			warn!("Received a SelectionNotify while already expecting INCR segments.");
			return Ok(ReadSelNotifyResult::EventNotRecognized);
		}
		// request the selection
		let mut reply = reader
			.conn
			.get_property(true, event.requestor, event.property, event.target, 0, u32::MAX / 4)
			.map_err(into_unknown)?
			.reply()
			.map_err(into_unknown)?;

		// we found something
		if reply.type_ == target_format {
			Ok(ReadSelNotifyResult::GotData(reply.value))
		} else if reply.type_ == self.atoms.INCR {
			// Note that we call the get_property again because we are
			// indicating that we are ready to receive the data by deleting the
			// property, however deleting only works if the type matches the
			// property type. But the type didn't match in the previous call.
			reply = reader
				.conn
				.get_property(
					true,
					event.requestor,
					event.property,
					self.atoms.INCR,
					0,
					u32::MAX / 4,
				)
				.map_err(into_unknown)?
				.reply()
				.map_err(into_unknown)?;
			trace!("Receiving INCR segments");
			*using_incr = true;
			// The placeholder carries a lower bound on the total size.
			if reply.value_len == 4 {
				let min_data_len = reply.value32().and_then(|mut vals| vals.next()).unwrap_or(0);
				incr_data.reserve(min_data_len as usize);
			}
			Ok(ReadSelNotifyResult::IncrStarted)
		} else {
			// this should never happen, we have sent a request only for supported types
			Err(Error::Unknown {
				description: String::from("incorrect type received from clipboard"),
			})
		}
	}

	/// Returns Ok(true) when the incr_data is ready
	fn handle_read_property_notify(
		&self,
		reader: &XContext,
		target_format: Atom,
		using_incr: bool,
		incr_data: &mut Vec<u8>,
		deadline: &mut Instant,
		event: PropertyNotifyEvent,
	) -> Result<bool> {
		if event.atom != self.atoms.SELCLIP_DATA || event.state != Property::NEW_VALUE {
			return Ok(false);
		}
		if !using_incr {
			// This must mean the selection owner received our request, and is
			// now preparing the data
			return Ok(false);
		}
		let reply = reader
			.conn
			.get_property(true, event.window, event.atom, target_format, 0, u32::MAX / 4)
			.map_err(into_unknown)?
			.reply()
			.map_err(into_unknown)?;

		if reply.value_len == 0 {
			// This indicates that all the data has been sent.
			return Ok(true);
		}
		incr_data.extend(reply.value);

		// Let's re-arm our deadline, since we received a valid segment.
		*deadline = Instant::now() + self.timeout;

		// Not yet complete
		Ok(false)
	}

	/// Places `data` on the clipboard, superseding any claim this context
	/// already holds, and leaves a responder thread serving it.
	fn set_data(&self, data: Vec<ClipboardData>) -> Result<()> {
		let mut claim = self.claim.lock();
		loop {
			match &*claim {
				ClaimState::Claiming | ClaimState::Relinquishing => {
					// Another thread is mid-transition; take our turn once
					// it settles.
					self.claim_done.wait(&mut claim);
				}
				ClaimState::Owning(_) => {
					// The newest set-call wins: tear the previous claim
					// down before claiming again with the new payload.
					let handle = match std::mem::replace(&mut *claim, ClaimState::Relinquishing) {
						ClaimState::Owning(handle) => handle,
						_ => unreachable!(),
					};
					drop(claim);
					self.cancel_responder(handle);
					claim = self.claim.lock();
					*claim = ClaimState::Idle;
					self.claim_done.notify_all();
				}
				ClaimState::Idle => break,
			}
		}
		*claim = ClaimState::Claiming;
		drop(claim);

		let result = self.claim_selection(data);

		let mut claim = self.claim.lock();
		match result {
			Ok(handle) => {
				*claim = ClaimState::Owning(handle);
				self.claim_done.notify_all();
				Ok(())
			}
			Err(e) => {
				*claim = ClaimState::Idle;
				self.claim_done.notify_all();
				Err(e)
			}
		}
	}

	/// Claims the CLIPBOARD selection with a fresh clip window.
	///
	/// The responder must already be running when ownership is asserted,
	/// so requests arriving right after the assertion get answered.
	fn claim_selection(&self, data: Vec<ClipboardData>) -> Result<OwnerHandle> {
		let ctx = Arc::new(XContext::new()?);
		let claim_time = self.fetch_server_time(&ctx)?;
		let targets = self.supported_targets(&data);
		let responder = {
			let ctx = Arc::clone(&ctx);
			let atoms = self.atoms;
			let timeout = self.timeout;
			thread::Builder::new()
				.name("selclip-responder".into())
				.spawn(move || {
					if let Err(error) =
						serve_requests(&ctx, atoms, data, targets, claim_time, timeout)
					{
						error!("The clipboard responder errored with: {error}");
					}
				})
				.map_err(into_unknown)?
		};
		let handle = OwnerHandle { ctx, responder };

		match self.assert_ownership(&handle.ctx, claim_time) {
			Ok(true) => Ok(handle),
			Ok(false) => {
				warn!("The server did not confirm our ownership claim.");
				self.cancel_responder(handle);
				Err(Error::ClipboardOccupied)
			}
			Err(e) => {
				self.cancel_responder(handle);
				Err(e)
			}
		}
	}

	/// Obtains a current server timestamp by provoking a `PropertyNotify`
	/// on the clip window with a zero-length append. ICCCM wants ownership
	/// asserted (and the TIMESTAMP target answered) with a real timestamp,
	/// not `CURRENT_TIME`.
	fn fetch_server_time(&self, ctx: &XContext) -> Result<u32> {
		ctx.conn
			.change_property8(
				PropMode::APPEND,
				ctx.win_id,
				self.atoms.SELCLIP_DATA,
				AtomEnum::STRING,
				&[],
			)
			.map_err(into_unknown)?;
		ctx.conn.flush().map_err(into_unknown)?;
		let deadline = Instant::now() + self.timeout;
		loop {
			match self.poll_event(ctx, deadline)? {
				Event::PropertyNotify(event)
					if event.window == ctx.win_id && event.atom == self.atoms.SELCLIP_DATA =>
				{
					return Ok(event.time);
				}
				_ => trace!("Unrelated event while waiting for a server timestamp."),
			}
		}
	}

	/// Asserts ownership on the secondary connection and returns whether
	/// the server confirms our clip window as the owner.
	fn assert_ownership(&self, ctx: &XContext, claim_time: u32) -> Result<bool> {
		ctx.conn
			.set_selection_owner(ctx.win_id, self.atoms.CLIPBOARD, claim_time)
			.map_err(into_unknown)?;
		ctx.conn.flush().map_err(into_unknown)?;
		let owner = ctx
			.conn
			.get_selection_owner(self.atoms.CLIPBOARD)
			.map_err(into_unknown)?
			.reply()
			.map_err(into_unknown)?
			.owner;
		Ok(owner == ctx.win_id)
	}

	/// The fixed target list served for this payload.
	fn supported_targets(&self, data: &[ClipboardData]) -> Vec<Atom> {
		let mut targets = vec![self.atoms.TARGETS, self.atoms.TIMESTAMP];
		for entry in data {
			targets.push(entry.format);
			if entry.format == self.atoms.UTF8_STRING {
				// Requestors predating UTF8_STRING ask for TEXT instead.
				targets.push(self.atoms.TEXT);
			}
		}
		targets
	}

	/// Forcibly stops the responder thread and waits for it to finish.
	///
	/// Destroying the clip window both wakes the responder out of its event
	/// wait and makes the server drop the ownership claim tied to it. The
	/// calls fail harmlessly when the responder already tore the window
	/// down after a graceful ownership loss.
	fn cancel_responder(&self, handle: OwnerHandle) {
		let OwnerHandle { ctx, responder } = handle;
		let _ = ctx.conn.destroy_window(ctx.win_id);
		let _ = ctx.conn.flush();
		if responder.join().is_err() {
			error!("The clipboard responder thread panicked.");
		}
	}
}

impl Drop for Clipboard {
	fn drop(&mut self) {
		let state = std::mem::replace(&mut *self.claim.lock(), ClaimState::Idle);
		if let ClaimState::Owning(handle) = state {
			trace!("Relinquishing the clipboard on context drop.");
			self.cancel_responder(handle);
		}
	}
}

/// Runs on the responder thread: answers conversion requests for the data
/// this process placed on the clipboard, until ownership is lost.
///
/// The payload and target list are owned by this thread alone; nothing else
/// in the process can observe them mid-replacement.
fn serve_requests(
	ctx: &XContext,
	atoms: Atoms,
	data: Vec<ClipboardData>,
	targets: Vec<Atom>,
	claim_time: u32,
	timeout: Duration,
) -> Result<()> {
	trace!("Started serving clipboard requests.");

	// Whatever way this thread ends, the clip window must be gone and with
	// it the server-side ownership claim. Destroying twice is harmless.
	let _guard = ScopeGuard::new(|| {
		let _ = ctx.conn.destroy_window(ctx.win_id);
		let _ = ctx.conn.flush();
	});

	// Many X servers cap requests around 256 KiB; anything close to that
	// (or above our own threshold) goes through INCR.
	let max_direct = ctx.conn.maximum_request_bytes().saturating_sub(1024).min(INCR_THRESHOLD);

	loop {
		match ctx.conn.wait_for_event().map_err(into_unknown)? {
			Event::DestroyNotify(_) => {
				// Forced cancellation: a newer claim or the context drop
				// destroyed our window.
				trace!("Clip window is being destroyed; the responder stops.");
				return Ok(());
			}
			Event::SelectionClear(event) if event.selection == atoms.CLIPBOARD => {
				// Somebody else owns the clipboard now.
				trace!("Somebody else owns the clipboard now");
				return Ok(());
			}
			Event::SelectionRequest(event) if event.selection == atoms.CLIPBOARD => {
				match handle_selection_request(
					ctx, atoms, &data, &targets, max_direct, claim_time, timeout, event,
				)? {
					ServeOutcome::Continue => (),
					ServeOutcome::Stop => return Ok(()),
				}
			}
			_event => {
				// May be useful for debugging but nothing else really.
			}
		}
	}
}

fn handle_selection_request(
	ctx: &XContext,
	atoms: Atoms,
	data: &[ClipboardData],
	targets: &[Atom],
	max_direct: usize,
	claim_time: u32,
	timeout: Duration,
	event: SelectionRequestEvent,
) -> Result<ServeOutcome> {
	// ICCCM: a requestor that names no property expects the reply on a
	// property named after the target.
	let property = if event.property == NONE { event.target } else { event.property };

	let success = if event.target == atoms.TARGETS {
		trace!("Handling a TARGETS request.");
		ctx.conn
			.change_property32(PropMode::REPLACE, event.requestor, property, AtomEnum::ATOM, targets)
			.map_err(into_unknown)?;
		true
	} else if event.target == atoms.TIMESTAMP {
		trace!("Handling a TIMESTAMP request.");
		ctx.conn
			.change_property32(
				PropMode::REPLACE,
				event.requestor,
				property,
				AtomEnum::INTEGER,
				&[claim_time],
			)
			.map_err(into_unknown)?;
		true
	} else if let Some(entry) = find_data(atoms, data, event.target) {
		if entry.bytes.len() >= max_direct {
			// Too big for a single property write; the SelectionNotify is
			// sent inside the transfer.
			let outcome = send_incr(ctx, atoms, entry, event, property, timeout)?;
			return Ok(outcome);
		}
		trace!("Handling a request for the clipboard contents.");
		ctx.conn
			.change_property8(PropMode::REPLACE, event.requestor, property, event.target, &entry.bytes)
			.map_err(into_unknown)?;
		true
	} else {
		trace!("Refusing a request for an unsupported target.");
		false
	};

	// on failure we notify the requestor of it
	let property = if success { property } else { AtomEnum::NONE.into() };
	send_selection_notify(ctx, event, property)?;
	ctx.conn.flush().map_err(into_unknown)?;
	Ok(ServeOutcome::Continue)
}

/// Looks up the stored entry serving `target`, treating the legacy TEXT
/// target as an alias for UTF-8 text.
fn find_data<'a>(
	atoms: Atoms,
	data: &'a [ClipboardData],
	target: Atom,
) -> Option<&'a ClipboardData> {
	let target = if target == atoms.TEXT { atoms.UTF8_STRING } else { target };
	data.iter().find(|entry| entry.format == target)
}

/// Tells the requestor that we finished (or refused) their request.
fn send_selection_notify(
	ctx: &XContext,
	event: SelectionRequestEvent,
	property: Atom,
) -> Result<()> {
	ctx.conn
		.send_event(
			false,
			event.requestor,
			EventMask::NO_EVENT,
			SelectionNotifyEvent {
				response_type: SELECTION_NOTIFY_EVENT,
				sequence: event.sequence,
				time: event.time,
				requestor: event.requestor,
				selection: event.selection,
				target: event.target,
				property,
			},
		)
		.map_err(into_unknown)?;
	Ok(())
}

/// Streams an oversized payload to the requestor as INCR segments.
///
/// 1. Place INCR plus the total length in the requestor's property and
///    notify.
/// 2. Each deletion of that property by the requestor requests the next
///    segment.
/// 3. A zero-length write terminates the transfer.
fn send_incr(
	ctx: &XContext,
	atoms: Atoms,
	entry: &ClipboardData,
	event: SelectionRequestEvent,
	property: Atom,
	timeout: Duration,
) -> Result<ServeOutcome> {
	trace!("Streaming {} bytes through INCR.", entry.bytes.len());

	let total_len = u32::try_from(entry.bytes.len()).unwrap_or(u32::MAX);
	ctx.conn
		.change_property32(PropMode::REPLACE, event.requestor, property, atoms.INCR, &[total_len])
		.map_err(into_unknown)?;
	// Property deletions drive the transfer, so subscribe to the
	// requestor's property events for its duration.
	ctx.conn
		.change_window_attributes(
			event.requestor,
			&ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
		)
		.map_err(into_unknown)?;
	send_selection_notify(ctx, event, property)?;
	ctx.conn.flush().map_err(into_unknown)?;

	let unsubscribe = || {
		let _ = ctx.conn.change_window_attributes(
			event.requestor,
			&ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
		);
		let _ = ctx.conn.flush();
	};

	let mut deadline = Instant::now() + timeout;
	let mut offset = 0usize;
	loop {
		if Instant::now() >= deadline {
			warn!("The requestor stalled an INCR transfer; aborting.");
			unsubscribe();
			return Ok(ServeOutcome::Continue);
		}
		match ctx.conn.poll_for_event().map_err(into_unknown)? {
			Some(Event::DestroyNotify(_)) => return Ok(ServeOutcome::Stop),
			Some(Event::SelectionClear(clear)) if clear.selection == atoms.CLIPBOARD => {
				return Ok(ServeOutcome::Stop);
			}
			Some(Event::PropertyNotify(notify))
				if notify.window == event.requestor
					&& notify.atom == property
					&& notify.state == Property::DELETE =>
			{
				// The requestor consumed the previous value; send the next
				// segment, or a zero-length terminator once drained.
				let end = (offset + INCR_CHUNK_SIZE).min(entry.bytes.len());
				let segment = &entry.bytes[offset..end];
				ctx.conn
					.change_property8(
						PropMode::REPLACE,
						event.requestor,
						property,
						event.target,
						segment,
					)
					.map_err(into_unknown)?;
				ctx.conn.flush().map_err(into_unknown)?;
				if segment.is_empty() {
					trace!("Finished the INCR transfer.");
					unsubscribe();
					return Ok(ServeOutcome::Continue);
				}
				offset = end;
				deadline = Instant::now() + timeout;
			}
			Some(Event::SelectionRequest(other)) if other.selection == atoms.CLIPBOARD => {
				// One conversion at a time; refuse instead of leaving the
				// other requestor to wait out its own timeout.
				trace!("Refusing a request arriving mid-transfer.");
				send_selection_notify(ctx, other, AtomEnum::NONE.into())?;
				ctx.conn.flush().map_err(into_unknown)?;
			}
			Some(_) => (),
			None => thread::sleep(Duration::from_millis(1)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// The public API has no reason to expose the TIMESTAMP target, so this
	// talks to the responder over the raw protocol instead.
	#[test]
	fn timestamp_target_reports_a_real_claim_time() {
		if std::env::var_os("DISPLAY").is_none() {
			eprintln!("skipping: no DISPLAY available");
			return;
		}
		let clipboard = Clipboard::new(Duration::from_secs(5)).unwrap();
		clipboard.set_text("timestamped".into()).unwrap();

		let reader = clipboard.reader.lock();
		reader.conn.delete_property(reader.win_id, clipboard.atoms.SELCLIP_DATA).unwrap();
		reader
			.conn
			.convert_selection(
				reader.win_id,
				clipboard.atoms.CLIPBOARD,
				clipboard.atoms.TIMESTAMP,
				clipboard.atoms.SELCLIP_DATA,
				Time::CURRENT_TIME,
			)
			.unwrap();
		reader.conn.sync().unwrap();

		let deadline = Instant::now() + Duration::from_secs(5);
		let claim_time = loop {
			match clipboard.poll_event(&reader, deadline).unwrap() {
				Event::SelectionNotify(event) => {
					assert_ne!(event.property, NONE, "the TIMESTAMP request was refused");
					let reply = reader
						.conn
						.get_property(
							true,
							reader.win_id,
							clipboard.atoms.SELCLIP_DATA,
							AtomEnum::INTEGER,
							0,
							4,
						)
						.unwrap()
						.reply()
						.unwrap();
					break reply.value32().and_then(|mut vals| vals.next()).unwrap();
				}
				_ => (),
			}
		};
		// CURRENT_TIME is the zero sentinel, never a real server timestamp.
		assert_ne!(claim_time, u32::from(Time::CURRENT_TIME));
	}
}
