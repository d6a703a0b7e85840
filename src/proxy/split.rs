//! Single-origin stream splitter.
//!
//! # Responsibilities
//! - Wrap one forward-only byte stream (an inbound request body)
//! - Hand out any number of independent readers over it
//! - Pull each byte range from the origin at most once
//!
//! # Design Decisions
//! - The splitter owns all state (origin, shared cursor, per-reader queues)
//!   behind one mutex; readers are thin views holding an id
//! - Pulled chunks are `Bytes`, so fanning a chunk out to N readers shares
//!   one allocation
//! - End-of-stream and read failures are sticky per reader and delivered only
//!   after that reader's buffered bytes
//! - Readers waiting on a pending origin are all woken after every pull

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, ReadBuf};

type Origin = Pin<Box<dyn AsyncRead + Send>>;

/// How the origin stream ended, as seen by a reader.
#[derive(Debug, Clone)]
enum Terminal {
    Eof,
    Failed { kind: io::ErrorKind, message: String },
}

impl Terminal {
    fn failed(err: &io::Error) -> Self {
        Terminal::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    fn closed() -> Self {
        Terminal::Failed {
            kind: io::ErrorKind::BrokenPipe,
            message: "stream splitter closed".to_string(),
        }
    }

    fn result(&self) -> io::Result<()> {
        match self {
            Terminal::Eof => Ok(()),
            Terminal::Failed { kind, message } => Err(io::Error::new(*kind, message.clone())),
        }
    }
}

/// Per-reader state. Invariant: `bytes_read + queued == max_bytes_read` for
/// every reader registered before the first pull.
#[derive(Debug, Default)]
struct Split {
    bytes_read: u64,
    unread: VecDeque<Bytes>,
    terminal: Option<Terminal>,
}

impl Split {
    /// Move as many queued bytes as fit into `buf`, splitting the head chunk
    /// when it is larger than the space left.
    fn drain_into(&mut self, buf: &mut ReadBuf<'_>) -> usize {
        let mut read = 0;
        while buf.remaining() > 0 {
            let Some(head) = self.unread.front_mut() else {
                break;
            };
            if head.len() > buf.remaining() {
                let part = head.split_to(buf.remaining());
                buf.put_slice(&part);
                read += part.len();
            } else {
                buf.put_slice(head);
                read += head.len();
                self.unread.pop_front();
            }
        }
        self.bytes_read += read as u64;
        read
    }
}

/// Freeze the first `n` bytes of a read buffer. A short read is copied out
/// so queued chunks do not pin the whole buffer allocation.
fn freeze_filled(mut chunk: BytesMut, n: usize) -> Bytes {
    if n < chunk.len() / 2 {
        Bytes::copy_from_slice(&chunk[..n])
    } else {
        chunk.truncate(n);
        chunk.freeze()
    }
}

struct Shared {
    origin: Option<Origin>,
    max_bytes_read: u64,
    ended: Option<Terminal>,
    splits: HashMap<usize, Split>,
    next_id: usize,
    waiters: Vec<Waker>,
}

impl Shared {
    /// Pull up to `shortfall` bytes from the origin and fan them out.
    fn pull(&mut self, cx: &mut Context<'_>, shortfall: usize) -> Poll<()> {
        let Some(origin) = self.origin.as_mut() else {
            self.end(Terminal::closed());
            return Poll::Ready(());
        };

        let mut chunk = BytesMut::zeroed(shortfall);
        let mut read_buf = ReadBuf::new(&mut chunk);
        match origin.as_mut().poll_read(cx, &mut read_buf) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(())) => {
                let n = read_buf.filled().len();
                if n == 0 {
                    self.end(Terminal::Eof);
                } else {
                    let bytes = freeze_filled(chunk, n);
                    self.max_bytes_read += n as u64;
                    for split in self.splits.values_mut() {
                        split.unread.push_back(bytes.clone());
                    }
                }
            }
            Poll::Ready(Err(e)) => self.end(Terminal::failed(&e)),
        }

        self.wake_waiters();
        Poll::Ready(())
    }

    fn end(&mut self, terminal: Terminal) {
        for split in self.splits.values_mut() {
            if split.terminal.is_none() {
                split.terminal = Some(terminal.clone());
            }
        }
        self.ended = Some(terminal);
    }

    fn park(&mut self, waker: &Waker) {
        if !self.waiters.iter().any(|w| w.will_wake(waker)) {
            self.waiters.push(waker.clone());
        }
    }

    fn wake_waiters(&mut self) {
        for waker in self.waiters.drain(..) {
            waker.wake();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> io::Result<MutexGuard<'_, Shared>> {
    shared
        .lock()
        .map_err(|_| io::Error::other("stream splitter state poisoned"))
}

/// Owner of a shared origin stream.
///
/// Dropping the splitter does not close the origin; readers already handed
/// out keep it alive. Call [`ReadSplitter::close`] to release it early.
pub struct ReadSplitter {
    shared: Arc<Mutex<Shared>>,
}

impl ReadSplitter {
    pub fn new<R>(origin: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                origin: Some(Box::pin(origin)),
                max_bytes_read: 0,
                ended: None,
                splits: HashMap::new(),
                next_id: 0,
                waiters: Vec::new(),
            })),
        }
    }

    /// Create a new independent reader.
    ///
    /// Readers created before any read see the whole stream. A reader
    /// created later starts at the current origin position.
    pub fn new_reader(&self) -> io::Result<SplitReader> {
        let mut shared = lock(&self.shared)?;
        let id = shared.next_id;
        shared.next_id += 1;

        let split = Split {
            bytes_read: shared.max_bytes_read,
            unread: VecDeque::new(),
            terminal: shared.ended.clone(),
        };
        shared.splits.insert(id, split);

        Ok(SplitReader {
            id,
            shared: self.shared.clone(),
        })
    }

    /// Highest origin offset pulled so far.
    pub fn max_bytes_read(&self) -> u64 {
        lock(&self.shared).map(|s| s.max_bytes_read).unwrap_or_default()
    }

    /// Number of readers still registered.
    pub fn live_readers(&self) -> usize {
        lock(&self.shared).map(|s| s.splits.len()).unwrap_or_default()
    }

    /// Release the origin stream. Readers keep their buffered bytes, then
    /// fail with `BrokenPipe` instead of pulling further.
    pub fn close(&self) -> io::Result<()> {
        let mut shared = lock(&self.shared)?;
        shared.origin = None;
        shared.wake_waiters();
        Ok(())
    }
}

impl fmt::Debug for ReadSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSplitter")
            .field("max_bytes_read", &self.max_bytes_read())
            .field("live_readers", &self.live_readers())
            .finish()
    }
}

/// One independent view over a [`ReadSplitter`]'s origin.
///
/// Dropping the reader deregisters it; other readers are unaffected.
pub struct SplitReader {
    id: usize,
    shared: Arc<Mutex<Shared>>,
}

impl SplitReader {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl fmt::Debug for SplitReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitReader").field("id", &self.id).finish()
    }
}

impl AsyncRead for SplitReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let id = self.id;
        let mut shared = lock(&self.shared)?;

        loop {
            let Some(split) = shared.splits.get(&id) else {
                return Poll::Ready(Err(io::Error::other("split reader deregistered")));
            };

            let to_length = split.bytes_read + buf.remaining() as u64;
            let has_buffered = !split.unread.is_empty();

            if split.terminal.is_none() && to_length > shared.max_bytes_read {
                let shortfall = (to_length - shared.max_bytes_read) as usize;
                if shared.pull(cx, shortfall).is_pending() && !has_buffered {
                    shared.park(cx.waker());
                    return Poll::Pending;
                }
            }

            let Some(split) = shared.splits.get_mut(&id) else {
                continue;
            };
            if split.drain_into(buf) > 0 {
                return Poll::Ready(Ok(()));
            }
            if let Some(terminal) = &split.terminal {
                return Poll::Ready(terminal.result());
            }
        }
    }
}

impl Drop for SplitReader {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.splits.remove(&self.id);
            shared.wake_waiters();
        }
    }
}
