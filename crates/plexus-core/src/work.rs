//! Deferred work: requests from the realtime thread, served on a background thread.
//!
//! A [`WorkThread`] owns one request ring shared by every worker registered on
//! it. The realtime side holds a [`WorkerHandle`] per worker and calls
//! [`schedule_work`](WorkerHandle::schedule_work), which appends a
//! `{size: u32, worker_id: u32, payload}` record and posts a counting
//! semaphore (a bounded channel of unit tokens). The background thread wakes,
//! drains every complete record, and hands each payload to the owning
//! [`Worker`]. Workers answer through a [`Responder`] into a private response
//! ring that the realtime side drains once per cycle with
//! [`process_work_responses`](WorkerHandle::process_work_responses).
//!
//! Requests are served in submission order. Responses are delivered in the
//! order they were written. Worker ids start at 1; 0 is never assigned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Mutex, RwLock};

use crate::ring_buffer::{RingReader, RingWriter, ring_buffer};

/// Bytes in front of every request payload: size and worker id.
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Bytes in front of every response payload: size.
pub const RESPONSE_HEADER_SIZE: usize = 4;

const INCOMPLETE_RETRY_DELAY: Duration = Duration::from_millis(6);
const INCOMPLETE_RETRY_LIMIT: u32 = 16;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);
const SIGNAL_CAPACITY: usize = 1024;

/// Ring space a request with `size` payload bytes occupies.
#[inline]
pub fn required_space(size: usize) -> usize {
    size + REQUEST_HEADER_SIZE
}

/// Failure reported by a [`Worker`].
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    /// The request bytes could not be understood.
    #[error("malformed work request: {0}")]
    Malformed(String),
    /// The response ring had no room for the answer.
    #[error("response buffer full")]
    ResponseOverflow,
    /// Any other failure.
    #[error("work failed: {0}")]
    Failed(String),
}

/// Serves deferred work requests on a background thread.
pub trait Worker: Send {
    /// Handles one request. May block, allocate, or do I/O.
    fn process_request(
        &mut self,
        request: &[u8],
        responder: &mut Responder<'_>,
    ) -> Result<(), WorkError>;
}

/// Write end of one worker's response ring.
pub struct Responder<'a> {
    writer: &'a mut RingWriter,
}

impl Responder<'_> {
    /// Queues a response. Returns `false` if it does not fit.
    pub fn respond(&mut self, data: &[u8]) -> bool {
        let Ok(size) = u32::try_from(data.len()) else {
            return false;
        };
        self.writer.write_parts(&[&size.to_le_bytes(), data]) > 0
    }
}

struct WorkerSlot {
    id: u32,
    worker: Mutex<Box<dyn Worker>>,
    responses: Mutex<RingWriter>,
    working: AtomicBool,
    failures: AtomicU32,
}

struct Shared {
    requests: Mutex<RingWriter>,
    /// Sorted by id.
    workers: RwLock<Vec<Arc<WorkerSlot>>>,
    next_id: AtomicU32,
    exit: AtomicBool,
    signal: Sender<()>,
}

impl Shared {
    fn post(&self) {
        // A full channel already guarantees a wake-up.
        let _ = self.signal.try_send(());
    }
}

/// Background thread that serves [`Worker`] requests.
pub struct WorkThread {
    name: String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    finished: Receiver<()>,
}

impl WorkThread {
    /// Spawns the thread with a request ring of at least `buffer_size` bytes.
    pub fn new(name: impl Into<String>, buffer_size: usize) -> std::io::Result<Self> {
        let name = name.into();
        let (writer, reader) = ring_buffer(buffer_size);
        let (signal, wake) = bounded(SIGNAL_CAPACITY);
        let (done, finished) = bounded(1);

        let shared = Arc::new(Shared {
            requests: Mutex::new(writer),
            workers: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(1),
            exit: AtomicBool::new(false),
            signal,
        });

        let thread = std::thread::Builder::new().name(name.clone()).spawn({
            let shared = Arc::clone(&shared);
            move || {
                serve(&shared, reader, &wake);
                let _ = done.send(());
            }
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(name = %name, buffer_size, "work thread started");

        Ok(Self {
            name,
            shared,
            thread: Some(thread),
            finished,
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity of the request ring in bytes.
    pub fn buffer_size(&self) -> usize {
        self.shared.requests.lock().capacity()
    }

    /// Whether the thread is serving requests.
    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.shared.exit.load(Ordering::Acquire)
    }

    /// Number of registered workers.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.read().len()
    }

    /// Registers `worker` with a private response ring of at least `response_size` bytes.
    ///
    /// The worker stays registered until the returned handle is dropped.
    pub fn register(&self, worker: Box<dyn Worker>, response_size: usize) -> WorkerHandle {
        let mut id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        }
        let (writer, reader) = ring_buffer(response_size);
        let slot = Arc::new(WorkerSlot {
            id,
            worker: Mutex::new(worker),
            responses: Mutex::new(writer),
            working: AtomicBool::new(false),
            failures: AtomicU32::new(0),
        });

        {
            let mut workers = self.shared.workers.write();
            let pos = workers.partition_point(|s| s.id < id);
            workers.insert(pos, Arc::clone(&slot));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(thread = %self.name, worker = id, "worker registered");

        let scratch = vec![0; reader.capacity()];
        WorkerHandle {
            slot,
            shared: Arc::clone(&self.shared),
            responses: reader,
            scratch,
        }
    }

    /// Stops the thread: sets the exit flag, posts once, and waits a bounded time.
    ///
    /// Returns `false` if the thread did not finish in time; it is then detached.
    /// Scheduling fails from this point on.
    pub fn shutdown(&mut self) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };
        self.shared.exit.store(true, Ordering::Release);
        self.shared.post();

        if self.finished.recv_timeout(SHUTDOWN_TIMEOUT).is_ok() {
            let _ = thread.join();
            #[cfg(feature = "tracing")]
            tracing::debug!(name = %self.name, "work thread stopped");
            true
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(name = %self.name, "work thread did not stop in time");
            false
        }
    }
}

impl Drop for WorkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkThread")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn serve(shared: &Shared, mut reader: RingReader, wake: &Receiver<()>) {
    let mut scratch = vec![0u8; reader.capacity()];
    while wake.recv().is_ok() {
        if shared.exit.load(Ordering::Acquire) {
            break;
        }
        drain_requests(shared, &mut reader, &mut scratch);
    }
}

fn drain_requests(shared: &Shared, reader: &mut RingReader, scratch: &mut [u8]) {
    let mut retries = 0;
    loop {
        let mut header = [0u8; REQUEST_HEADER_SIZE];
        if reader.peek(&mut header) == 0 {
            return;
        }
        let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let id = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if !reader.can_read(required_space(size)) {
            if retries >= INCOMPLETE_RETRY_LIMIT || shared.exit.load(Ordering::Acquire) {
                return;
            }
            retries += 1;
            std::thread::sleep(INCOMPLETE_RETRY_DELAY);
            continue;
        }
        retries = 0;

        reader.skip(REQUEST_HEADER_SIZE);
        if size > scratch.len() {
            reader.skip(size);
            continue;
        }
        if size > 0 {
            reader.read(&mut scratch[..size]);
        }
        dispatch(shared, id, &scratch[..size]);
    }
}

fn dispatch(shared: &Shared, id: u32, request: &[u8]) {
    let slot = {
        let workers = shared.workers.read();
        let Ok(pos) = workers.binary_search_by_key(&id, |s| s.id) else {
            #[cfg(feature = "tracing")]
            tracing::trace!(worker = id, "request for unregistered worker dropped");
            return;
        };
        let slot = Arc::clone(&workers[pos]);
        slot.working.store(true, Ordering::SeqCst);
        slot
    };

    let result = {
        let mut worker = slot.worker.lock();
        let mut responses = slot.responses.lock();
        worker.process_request(
            request,
            &mut Responder {
                writer: &mut responses,
            },
        )
    };
    slot.working.store(false, Ordering::SeqCst);

    if let Err(_err) = result {
        slot.failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::warn!(worker = id, error = %_err, "work request failed");
    }
}

/// Realtime-side handle of a registered [`Worker`].
///
/// Dropping the handle deregisters the worker, then waits (bounded) for any
/// request it is serving to finish.
pub struct WorkerHandle {
    slot: Arc<WorkerSlot>,
    shared: Arc<Shared>,
    responses: RingReader,
    scratch: Vec<u8>,
}

impl WorkerHandle {
    /// Id assigned at registration. Never 0.
    pub fn id(&self) -> u32 {
        self.slot.id
    }

    /// Queues `data` for the worker. Realtime safe.
    ///
    /// Returns `false`, with nothing queued, if the record does not fit, the
    /// request ring is momentarily held by another scheduler, or the thread is
    /// shutting down.
    pub fn schedule_work(&self, data: &[u8]) -> bool {
        if self.shared.exit.load(Ordering::Acquire) {
            return false;
        }
        let Ok(size) = u32::try_from(data.len()) else {
            return false;
        };
        let Some(mut requests) = self.shared.requests.try_lock() else {
            return false;
        };
        let written =
            requests.write_parts(&[&size.to_le_bytes(), &self.slot.id.to_le_bytes(), data]);
        drop(requests);
        if written == 0 {
            return false;
        }
        self.shared.post();
        true
    }

    /// Hands every complete response to `handle`, oldest first. Realtime safe.
    ///
    /// A response that is still being written stays queued for the next call.
    /// Returns the number of responses delivered.
    pub fn process_work_responses(&mut self, mut handle: impl FnMut(&[u8])) -> usize {
        let mut delivered = 0;
        loop {
            let mut header = [0u8; RESPONSE_HEADER_SIZE];
            if self.responses.peek(&mut header) == 0 {
                break;
            }
            let size = u32::from_le_bytes(header) as usize;
            if !self.responses.can_read(RESPONSE_HEADER_SIZE + size) {
                break;
            }
            self.responses.skip(RESPONSE_HEADER_SIZE);
            if size > self.scratch.len() {
                self.responses.skip(size);
                continue;
            }
            if size > 0 {
                self.responses.read(&mut self.scratch[..size]);
            }
            handle(&self.scratch[..size]);
            delivered += 1;
        }
        delivered
    }

    /// Whether the background thread is inside this worker right now.
    pub fn is_working(&self) -> bool {
        self.slot.working.load(Ordering::SeqCst)
    }

    /// Number of requests the worker rejected with an error.
    pub fn failed_requests(&self) -> u32 {
        self.slot.failures.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let id = self.slot.id;
        self.shared.workers.write().retain(|s| s.id != id);

        let deadline = Instant::now() + RELEASE_TIMEOUT;
        while self.slot.working.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.slot.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    /// Records every request and echoes it back.
    struct Echo {
        seen: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Worker for Echo {
        fn process_request(
            &mut self,
            request: &[u8],
            responder: &mut Responder<'_>,
        ) -> Result<(), WorkError> {
            self.seen.lock().push(request.to_vec());
            if responder.respond(request) {
                Ok(())
            } else {
                Err(WorkError::ResponseOverflow)
            }
        }
    }

    struct Failing;

    impl Worker for Failing {
        fn process_request(&mut self, _: &[u8], _: &mut Responder<'_>) -> Result<(), WorkError> {
            Err(WorkError::Malformed("always".into()))
        }
    }

    struct Slow;

    impl Worker for Slow {
        fn process_request(&mut self, _: &[u8], _: &mut Responder<'_>) -> Result<(), WorkError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(())
        }
    }

    fn echo(thread: &WorkThread) -> (WorkerHandle, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = thread.register(
            Box::new(Echo {
                seen: Arc::clone(&seen),
            }),
            1024,
        );
        (handle, seen)
    }

    #[test]
    fn test_required_space() {
        assert_eq!(required_space(0), 8);
        assert_eq!(required_space(10), 18);
    }

    #[test]
    fn test_ids_start_at_one() {
        let thread = WorkThread::new("ids", 256).unwrap();
        let (a, _) = echo(&thread);
        let (b, _) = echo(&thread);
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(thread.worker_count(), 2);
    }

    #[test]
    fn test_request_delivered_once_with_same_bytes() {
        let thread = WorkThread::new("once", 256).unwrap();
        let (handle, seen) = echo(&thread);

        assert!(handle.schedule_work(&[1, 2, 3, 4, 5]));
        assert!(wait_until(|| !seen.lock().is_empty()));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(*seen.lock(), vec![vec![1, 2, 3, 4, 5]]);
    }

    #[test]
    fn test_responses_in_fifo_order() {
        let thread = WorkThread::new("fifo", 1024).unwrap();
        let (mut handle, seen) = echo(&thread);

        for i in 0..10u8 {
            assert!(handle.schedule_work(&[i, i]));
        }
        assert!(wait_until(|| seen.lock().len() == 10));

        let mut received = Vec::new();
        assert!(wait_until(|| {
            handle.process_work_responses(|data| received.push(data.to_vec()));
            received.len() == 10
        }));
        let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i, i]).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_oversized_request_rejected() {
        let thread = WorkThread::new("big", 32).unwrap();
        let (handle, seen) = echo(&thread);

        assert!(!handle.schedule_work(&[0; 64]));
        assert!(handle.schedule_work(&[9; 4]));
        assert!(wait_until(|| seen.lock().len() == 1));
        assert_eq!(seen.lock()[0], vec![9; 4]);
    }

    #[test]
    fn test_failing_worker_is_isolated() {
        let thread = WorkThread::new("isolate", 1024).unwrap();
        let bad = thread.register(Box::new(Failing), 64);
        let (good, seen) = echo(&thread);

        assert!(bad.schedule_work(b"x"));
        assert!(good.schedule_work(b"y"));
        assert!(bad.schedule_work(b"z"));

        assert!(wait_until(|| bad.failed_requests() == 2));
        assert!(wait_until(|| seen.lock().len() == 1));
        assert_eq!(good.failed_requests(), 0);
    }

    #[test]
    fn test_drop_worker_mid_flight() {
        let thread = WorkThread::new("midflight", 4096).unwrap();
        let slow = thread.register(Box::new(Slow), 64);
        for _ in 0..20 {
            slow.schedule_work(&[0; 16]);
        }
        std::thread::sleep(Duration::from_millis(12));
        drop(slow);
        assert_eq!(thread.worker_count(), 0);

        let (after, seen) = echo(&thread);
        assert!(wait_until(|| after.schedule_work(b"still alive")));
        assert!(wait_until(|| seen.lock().iter().any(|r| r == b"still alive")));
    }

    #[test]
    fn test_no_scheduling_after_shutdown() {
        let mut thread = WorkThread::new("shutdown", 256).unwrap();
        let (handle, _) = echo(&thread);
        assert!(thread.is_running());
        assert!(thread.shutdown());
        assert!(!thread.is_running());
        assert!(!handle.schedule_work(b"late"));
        assert!(thread.shutdown());
    }

    #[test]
    fn test_response_overflow_reported() {
        let thread = WorkThread::new("overflow", 1024).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = thread.register(
            Box::new(Echo {
                seen: Arc::clone(&seen),
            }),
            8,
        );
        assert!(handle.schedule_work(&[1; 16]));
        assert!(wait_until(|| handle.failed_requests() == 1));
    }
}
