use super::{msg_id_name, BcCamera, Connection, Error, Result, UNSOLICITED_SKIP_LIMIT};
use crate::bc::{model::*, xml::*};
use crate::bcmedia::framer::BcMediaFramer;
use crate::bcmedia::model::{BcMedia, BcMediaInfo};
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the camera gets to answer a preview request
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);
/// The receive loop polls at this interval so it can notice the stop flag
const STREAM_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The stream names supported by BC
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stream {
    /// This is the HD stream
    Main,
    /// This is the SD stream
    Sub,
    /// This stream represents a balance between SD and HD. It is only
    /// available on some cameras
    Extern,
}

impl Stream {
    /// The `stream_type` header byte
    fn stream_code(&self) -> u8 {
        match self {
            Stream::Main => 0,
            Stream::Sub => 1,
            Stream::Extern => 2,
        }
    }

    /// The handle the official clients use for this stream
    fn handle(&self) -> u32 {
        match self {
            Stream::Main => 0,
            Stream::Sub => 256,
            Stream::Extern => 1024,
        }
    }

    fn stream_name(&self) -> &'static str {
        match self {
            Stream::Main => "mainStream",
            Stream::Sub => "subStream",
            Stream::Extern => "externStream",
        }
    }
}

/// Counters kept while a stream runs. Snapshot them with
/// [`StreamData::stats`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamStats {
    /// Media units emitted by the framer
    pub frames_received: u64,
    /// Bytes those units occupied on the wire, padding included
    pub bytes_received: u64,
    /// Video key frames among them
    pub i_frames: u64,
    /// Video delta frames among them
    pub p_frames: u64,
}

type FrameCallback = Box<dyn FnMut(BcMedia) + Send>;
type InfoCallback = Box<dyn FnMut(BcMediaInfo) + Send>;
type ErrorCallback = Box<dyn FnMut(Error) + Send>;

/// The consumer callbacks of a stream session
///
/// All callbacks run synchronously on the stream's receive thread. They must
/// not block the network indefinitely; a consumer is expected to hand frames
/// off to its own queue.
#[derive(Default)]
pub struct StreamHandlers {
    on_frame: Option<FrameCallback>,
    on_info: Option<InfoCallback>,
    on_error: Option<ErrorCallback>,
}

impl StreamHandlers {
    /// A handler set with no callbacks registered
    pub fn new() -> Self {
        Default::default()
    }

    /// Called with every media unit the framer emits, in wire order
    pub fn on_frame(mut self, cb: impl FnMut(BcMedia) + Send + 'static) -> Self {
        self.on_frame = Some(Box::new(cb));
        self
    }

    /// Called once with the first stream info of the session
    pub fn on_info(mut self, cb: impl FnMut(BcMediaInfo) + Send + 'static) -> Self {
        self.on_info = Some(Box::new(cb));
        self
    }

    /// Called when the receive loop dies of a fatal error
    pub fn on_error(mut self, cb: impl FnMut(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }
}

/// A handle on a running stream
///
/// Dropping it stops the stream: the video stop message is sent best-effort
/// and the receive thread is joined.
pub struct StreamData<'a> {
    camera: &'a BcCamera,
    channel_id: u8,
    stream: Stream,
    handle: Option<JoinHandle<()>>,
    abort_handle: Arc<AtomicBool>,
    stats: Arc<Mutex<StreamStats>>,
}

impl BcCamera {
    ///
    /// Starts a video stream
    ///
    /// # Parameters
    ///
    /// * `channel_id` - The channel to stream, usually 0 unless an NVR
    ///
    /// * `stream` - The stream quality to request
    ///
    /// * `handlers` - The consumer callbacks, invoked on the receive thread
    ///
    /// # Returns
    ///
    /// A [`StreamData`] session handle. Stopping it (or dropping it) ends
    /// the stream.
    ///
    pub fn start_stream(
        &self,
        channel_id: u8,
        stream: Stream,
        handlers: StreamHandlers,
    ) -> Result<StreamData<'_>> {
        if !self.is_logged_in() {
            return Err(Error::NotLoggedIn);
        }

        let connection = self.get_connection();
        let msg_num = self.new_message_num();

        let start_video = preview_message(MSG_ID_VIDEO, channel_id, stream, msg_num);
        connection.send_message(&start_video)?;

        let reply = receive_video_reply(&connection)?;
        if reply.meta.response_code != RESPONSE_CODE_OK {
            return Err(Error::CameraServiceUnavailable);
        }
        // The decoder has already marked the msg_num binary if the reply's
        // extension said so
        if let Some(Extension {
            binary_data: Some(1),
            ..
        }) = reply.extension
        {
            debug!("Binary mode on msg_num {}", reply.meta.msg_num);
        }

        let abort_handle = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(StreamStats::default()));

        let thread_connection = connection.clone();
        let thread_abort = abort_handle.clone();
        let thread_stats = stats.clone();
        let handle = thread::spawn(move || {
            receive_loop(thread_connection, thread_abort, thread_stats, handlers)
        });

        Ok(StreamData {
            camera: self,
            channel_id,
            stream,
            handle: Some(handle),
            abort_handle,
            stats,
        })
    }
}

impl StreamData<'_> {
    /// Snapshot the stream counters
    pub fn stats(&self) -> StreamStats {
        self.stats.lock().unwrap().clone()
    }

    /// Stop the stream
    ///
    /// Best effort: the video stop message may be lost on a dying
    /// connection, but the receive thread is always joined and the
    /// binary-mode set cleared.
    pub fn stop(mut self) {
        self.shutdown_stream();
    }

    fn shutdown_stream(&mut self) {
        if self.handle.is_none() {
            return;
        }
        self.abort_handle.store(true, Ordering::Relaxed);

        let connection = self.camera.get_connection();
        let msg_num = self.camera.new_message_num();
        let stop_video =
            preview_message(MSG_ID_VIDEO_STOP, self.channel_id, self.stream, msg_num);
        if let Err(e) = connection.send_message(&stop_video) {
            debug!("Best-effort video stop failed: {}", e);
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        connection.clear_binary_mode();
        debug!("Video stream stopped");
    }
}

impl Drop for StreamData<'_> {
    fn drop(&mut self) {
        self.shutdown_stream();
    }
}

fn preview_message(msg_id: u32, channel_id: u8, stream: Stream, msg_num: u16) -> Bc {
    Bc::new_from_xml(
        BcMeta {
            msg_id,
            channel_id,
            stream_type: stream.stream_code(),
            response_code: 0,
            msg_num,
            class: 0x6414,
        },
        BcXml {
            preview: Some(Preview {
                version: xml_ver(),
                channel_id,
                handle: stream.handle(),
                stream_type: Some(stream.stream_name().to_string()),
            }),
            ..Default::default()
        },
    )
}

fn receive_video_reply(connection: &Connection) -> Result<Bc> {
    let mut reply = connection.receive_message(STREAM_START_TIMEOUT)?;
    for _ in 0..UNSOLICITED_SKIP_LIMIT {
        if reply.meta.msg_id == MSG_ID_VIDEO {
            return Ok(reply);
        }
        debug!(
            "Skipping unsolicited {} message while starting the stream",
            msg_id_name(reply.meta.msg_id)
        );
        reply = connection.receive_message(STREAM_START_TIMEOUT)?;
    }
    Err(Error::UnintelligibleReply {
        reply: Arc::new(Box::new(reply)),
        why: "The camera did not answer the preview request",
    })
}

fn receive_loop(
    connection: Arc<Connection>,
    abort: Arc<AtomicBool>,
    stats: Arc<Mutex<StreamStats>>,
    mut handlers: StreamHandlers,
) {
    let mut framer = BcMediaFramer::new();
    let mut info_delivered = false;

    while !abort.load(Ordering::Relaxed) {
        let msg = match connection.receive_message(STREAM_POLL_TIMEOUT) {
            Ok(msg) => msg,
            // An idle camera is not an error, poll again
            Err(Error::Timeout) => continue,
            Err(e) => {
                // A socket torn down by stop() is part of cancellation, not
                // an error the consumer needs to hear about
                if abort.load(Ordering::Relaxed) {
                    return;
                }
                error!("Stream receive failed: {}", e);
                if let Some(cb) = handlers.on_error.as_mut() {
                    cb(e);
                }
                return;
            }
        };

        if msg.meta.msg_id != MSG_ID_VIDEO {
            trace!(
                "Ignoring {} message during streaming",
                msg_id_name(msg.meta.msg_id)
            );
            continue;
        }

        let data = match msg.payload {
            Some(BcPayloads::Binary(data)) => data,
            _ => continue,
        };

        framer.extend(&data);
        while let Some((frame, consumed)) = framer.next_frame() {
            {
                let mut stats = stats.lock().unwrap();
                stats.frames_received += 1;
                stats.bytes_received += consumed as u64;
                match &frame {
                    BcMedia::Iframe(_) => stats.i_frames += 1,
                    BcMedia::Pframe(_) => stats.p_frames += 1,
                    _ => {}
                }
            }

            if let BcMedia::Info(info) = &frame {
                if !info_delivered {
                    info_delivered = true;
                    info!(
                        "Stream info: {}x{} @ {} fps",
                        info.video_width, info.video_height, info.fps
                    );
                    if let Some(cb) = handlers.on_info.as_mut() {
                        cb(info.clone());
                    }
                }
            }

            if let Some(cb) = handlers.on_frame.as_mut() {
                cb(frame);
            }
        }
    }
}
