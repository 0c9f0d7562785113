//! Thin façade over in-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). Receive
//! handles are **waitable**: callers post `irecv` and call `.wait()` before
//! they trust that the data is there.
//!
//! Collective file access is layered on top of the group primitives: every
//! rank opens the same path on a shared filesystem, transfers its own disjoint
//! byte range and then meets the others at a barrier. A rank that skips one of
//! these calls stalls the group; that is the contract, not a bug.

use crate::heat_error::HeatIoError;
use crate::algs::wire::{cast_slice, cast_slice_mut};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Tag carrying interior tiles to the snapshot coordinator.
pub const FIELD_TAG: CommTag = CommTag(22);

// Reserved for collectives emulated over point-to-point mailboxes.
const BCAST_TAG: CommTag = CommTag(u16::MAX);
const SCATTER_TAG: CommTag = CommTag(u16::MAX - 1);

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Handle for a transfer that already completed inside the posting call.
#[derive(Debug)]
pub struct Ready(Option<Vec<u8>>);

impl Wait for Ready {
    fn wait(self) -> Option<Vec<u8>> {
        self.0
    }
}

/// How a shared file is opened by the group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileMode {
    /// Create or truncate, write only.
    CreateWrite,
    /// Existing file, read only.
    ReadOnly,
}

/// A file opened collectively by every rank of a group.
#[derive(Debug)]
pub struct SharedFile {
    file: File,
    path: PathBuf,
    mode: FileMode,
}

impl SharedFile {
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the file in bytes.
    pub fn len(&self) -> Result<u64, HeatIoError> {
        Ok(self.file.metadata()?.len())
    }
}

/// Blocking group communication interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Blocking receive of the next message from `peer` on `tag`, returned
    /// whole. Unlike `irecv` nothing is cut to a buffer length, so callers
    /// can validate the size the sender actually posted.
    fn recv_payload(&self, peer: usize, tag: u16) -> Result<Vec<u8>, HeatIoError>;

    /// Block until every rank of the group has entered the barrier.
    fn barrier(&self) -> Result<(), HeatIoError>;

    /// Overwrite `buf` on every rank with the contents held by `root`.
    fn broadcast_u64(&self, root: usize, buf: &mut [u64]) -> Result<(), HeatIoError>;

    /// Split `send` (significant on `root` only) into `size()` equal chunks;
    /// rank `i` receives chunk `i` into `recv`.
    fn scatter_f64(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv: &mut [f64],
    ) -> Result<(), HeatIoError>;

    /// Terminate the whole group with `code`.
    fn abort(&self, code: i32);

    /// Pass `res` through; on error, abort the group first.
    fn abort_on_error<T>(&self, res: Result<T, HeatIoError>) -> Result<T, HeatIoError> {
        res.map_err(|err| {
            log::error!("rank {}: {err}; aborting process group", self.rank());
            self.abort(err.exit_code());
            err
        })
    }

    /// Open `path` on every rank. In create mode rank 0 truncates the file
    /// before anyone else opens it.
    fn open_shared(&self, path: &Path, mode: FileMode) -> Result<SharedFile, HeatIoError> {
        let open_err = |source| HeatIoError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = match mode {
            FileMode::CreateWrite => {
                if self.rank() == 0 {
                    let created = OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(path)
                        .map_err(open_err);
                    let file = self.abort_on_error(created)?;
                    self.barrier()?;
                    file
                } else {
                    self.barrier()?;
                    let opened = OpenOptions::new().write(true).open(path).map_err(open_err);
                    self.abort_on_error(opened)?
                }
            }
            FileMode::ReadOnly => self.abort_on_error(File::open(path).map_err(open_err))?,
        };
        self.barrier()?;
        Ok(SharedFile {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }

    /// Independent positional write; only the calling rank participates.
    fn write_at(&self, file: &mut SharedFile, offset: u64, buf: &[u8]) -> Result<(), HeatIoError> {
        self.abort_on_error(seek_write(&mut file.file, offset, buf))
    }

    /// Positional write in which every rank participates.
    fn write_at_all(
        &self,
        file: &mut SharedFile,
        offset: u64,
        buf: &[u8],
    ) -> Result<(), HeatIoError> {
        self.write_at(file, offset, buf)?;
        self.barrier()
    }

    /// Positional read in which every rank participates.
    fn read_at_all(
        &self,
        file: &mut SharedFile,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), HeatIoError> {
        self.abort_on_error(seek_read(&mut file.file, offset, buf))?;
        self.barrier()
    }

    /// Flush and close `file` on every rank.
    fn close_shared(&self, file: SharedFile) -> Result<(), HeatIoError> {
        if file.mode == FileMode::CreateWrite {
            let res = file.file.sync_all().map_err(HeatIoError::from);
            self.abort_on_error(res)?;
        }
        drop(file);
        self.barrier()
    }
}

fn seek_write(file: &mut File, offset: u64, buf: &[u8]) -> Result<(), HeatIoError> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    Ok(())
}

fn seek_read(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<(), HeatIoError> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

/// Compile-time single-process comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn recv_payload(&self, peer: usize, _tag: u16) -> Result<Vec<u8>, HeatIoError> {
        Err(HeatIoError::CommError {
            neighbor: peer,
            source: "single-process group has no peers".into(),
        })
    }

    fn barrier(&self) -> Result<(), HeatIoError> {
        Ok(())
    }

    fn broadcast_u64(&self, _root: usize, _buf: &mut [u64]) -> Result<(), HeatIoError> {
        Ok(())
    }

    fn scatter_f64(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv: &mut [f64],
    ) -> Result<(), HeatIoError> {
        let send = root_send_buffer(root, send, recv.len())?;
        recv.copy_from_slice(send);
        Ok(())
    }

    /// With a single process the returned error already ends the run.
    fn abort(&self, code: i32) {
        log::debug!("NoComm abort requested with code {code}");
    }
}

/// Root-side scatter input, checked to hold `expected` values.
fn root_send_buffer(
    root: usize,
    send: Option<&[f64]>,
    expected: usize,
) -> Result<&[f64], HeatIoError> {
    let send = send.ok_or_else(|| scatter_error(root, "root has no send buffer"))?;
    if send.len() != expected {
        return Err(scatter_error(
            root,
            format!("send holds {} values, expected {expected}", send.len()),
        ));
    }
    Ok(send)
}

fn scatter_error(root: usize, msg: impl Into<String>) -> HeatIoError {
    HeatIoError::CommError {
        neighbor: root,
        source: msg.into().into(),
    }
}

// --- ThreadComm: simulated process group, one OS thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

#[derive(Debug)]
struct GroupShared {
    size: usize,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    barrier: Mutex<BarrierState>,
    barrier_cv: Condvar,
    aborted: AtomicBool,
    abort_code: AtomicI32,
}

impl GroupShared {
    fn aborted(&self) -> Option<i32> {
        self.aborted
            .load(Ordering::Acquire)
            .then(|| self.abort_code.load(Ordering::Acquire))
    }

    fn post(&self, key: Key, data: Bytes) {
        self.mailbox.entry(key).or_default().push_back(data);
    }

    /// Spin until a message for `key` shows up or the group is aborted.
    fn take(&self, key: Key) -> Option<Bytes> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&key) {
                if let Some(bytes) = queue.pop_front() {
                    return Some(bytes);
                }
            }
            if self.aborted().is_some() {
                return None;
            }
            std::thread::yield_now();
        }
    }
}

/// Pending receive on a [`ThreadComm`]; the message is taken on `wait`.
pub struct ThreadRecv {
    shared: Arc<GroupShared>,
    key: Key,
    len: usize,
}

impl Wait for ThreadRecv {
    fn wait(self) -> Option<Vec<u8>> {
        self.shared
            .take(self.key)
            .map(|bytes| bytes[..self.len.min(bytes.len())].to_vec())
    }
}

/// One rank of an in-process group created by [`ThreadComm::group`].
///
/// Point-to-point messages are FIFO per `(source, destination, tag)`.
/// `abort` poisons the group: every rank blocked in a receive or collective
/// is released with [`HeatIoError::GroupAborted`].
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<GroupShared>,
    collectives: Arc<AtomicUsize>,
}

impl ThreadComm {
    /// Build the handles of a `size`-rank group, indexed by rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(GroupShared {
            size,
            mailbox: DashMap::new(),
            barrier: Mutex::new(BarrierState::default()),
            barrier_cv: Condvar::new(),
            aborted: AtomicBool::new(false),
            abort_code: AtomicI32::new(0),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: shared.clone(),
                collectives: Arc::new(AtomicUsize::new(0)),
            })
            .collect()
    }

    /// Abort code if any rank of the group aborted.
    pub fn abort_code(&self) -> Option<i32> {
        self.shared.aborted()
    }

    /// Number of collective calls this rank has issued.
    pub fn collectives_issued(&self) -> usize {
        self.collectives.load(Ordering::Relaxed)
    }

    fn enter_collective(&self) -> Result<(), HeatIoError> {
        self.collectives.fetch_add(1, Ordering::Relaxed);
        self.check_aborted()
    }

    fn check_aborted(&self) -> Result<(), HeatIoError> {
        match self.shared.aborted() {
            Some(code) => Err(HeatIoError::GroupAborted { code }),
            None => Ok(()),
        }
    }

    fn recv_from(&self, src: usize, tag: CommTag) -> Result<Bytes, HeatIoError> {
        match self.shared.take((src, self.rank, tag.as_u16())) {
            Some(bytes) => Ok(bytes),
            None => {
                self.check_aborted()?;
                Err(HeatIoError::CommError {
                    neighbor: src,
                    source: format!("no message from rank {src}").into(),
                })
            }
        }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        self.shared
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> ThreadRecv {
        ThreadRecv {
            shared: self.shared.clone(),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn recv_payload(&self, peer: usize, tag: u16) -> Result<Vec<u8>, HeatIoError> {
        self.recv_from(peer, CommTag(tag)).map(|bytes| bytes.to_vec())
    }

    fn barrier(&self) -> Result<(), HeatIoError> {
        self.enter_collective()?;
        let mut state = self.shared.barrier.lock();
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.barrier_cv.notify_all();
            return Ok(());
        }
        while state.generation == generation {
            if let Some(code) = self.shared.aborted() {
                return Err(HeatIoError::GroupAborted { code });
            }
            self.shared.barrier_cv.wait(&mut state);
        }
        Ok(())
    }

    fn broadcast_u64(&self, root: usize, buf: &mut [u64]) -> Result<(), HeatIoError> {
        self.enter_collective()?;
        if self.rank == root {
            let payload = Bytes::copy_from_slice(cast_slice(&*buf));
            for peer in (0..self.size()).filter(|&p| p != root) {
                self.shared
                    .post((root, peer, BCAST_TAG.as_u16()), payload.clone());
            }
            return Ok(());
        }
        let bytes = self.recv_from(root, BCAST_TAG)?;
        let dst = cast_slice_mut(buf);
        if bytes.len() != dst.len() {
            return Err(HeatIoError::CommError {
                neighbor: root,
                source: format!("broadcast of {} bytes, expected {}", bytes.len(), dst.len())
                    .into(),
            });
        }
        dst.copy_from_slice(&bytes);
        Ok(())
    }

    fn scatter_f64(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv: &mut [f64],
    ) -> Result<(), HeatIoError> {
        self.enter_collective()?;
        let chunk = recv.len();
        if self.rank == root {
            let send = self.abort_on_error(root_send_buffer(root, send, chunk * self.size()))?;
            for (peer, block) in send.chunks(chunk.max(1)).enumerate() {
                if peer == root {
                    recv.copy_from_slice(block);
                } else {
                    self.shared.post(
                        (root, peer, SCATTER_TAG.as_u16()),
                        Bytes::copy_from_slice(cast_slice(block)),
                    );
                }
            }
            return Ok(());
        }
        let bytes = self.recv_from(root, SCATTER_TAG)?;
        let dst = cast_slice_mut(recv);
        if bytes.len() != dst.len() {
            return Err(scatter_error(
                root,
                format!("scatter block of {} bytes, expected {}", bytes.len(), dst.len()),
            ));
        }
        dst.copy_from_slice(&bytes);
        Ok(())
    }

    fn abort(&self, code: i32) {
        self.shared.abort_code.store(code, Ordering::Release);
        self.shared.aborted.store(true, Ordering::Release);
        let _guard = self.shared.barrier.lock();
        self.shared.barrier_cv.notify_all();
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, HeatIoError, Ready, root_send_buffer};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{
        Communicator as _, CommunicatorCollectives as _, Destination as _, Root as _,
        Source as _,
    };

    /// World communicator of an MPI run. Dropping it finalizes MPI.
    pub struct MpiComm {
        pub world: SimpleCommunicator,
        pub rank: usize,
        pub size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, HeatIoError> {
            let universe = mpi::initialize().ok_or(HeatIoError::MpiInit)?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = Ready;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Ready {
            let (mut data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            data.truncate(buf.len());
            Ready(Some(data))
        }

        fn recv_payload(&self, peer: usize, tag: u16) -> Result<Vec<u8>, HeatIoError> {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            Ok(data)
        }

        fn barrier(&self) -> Result<(), HeatIoError> {
            self.world.barrier();
            Ok(())
        }

        fn broadcast_u64(&self, root: usize, buf: &mut [u64]) -> Result<(), HeatIoError> {
            self.world.process_at_rank(root as i32).broadcast_into(buf);
            Ok(())
        }

        fn scatter_f64(
            &self,
            root: usize,
            send: Option<&[f64]>,
            recv: &mut [f64],
        ) -> Result<(), HeatIoError> {
            let root_process = self.world.process_at_rank(root as i32);
            if self.rank == root {
                let send = root_send_buffer(root, send, recv.len() * self.size);
                let send = self.abort_on_error(send)?;
                root_process.scatter_into_root(send, recv);
            } else {
                root_process.scatter_into(recv);
            }
            Ok(())
        }

        fn abort(&self, code: i32) {
            self.world.abort(code)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let comms = ThreadComm::group(2);
        let mut recv_buf = [0u8; 4];

        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn groups_do_not_share_mailboxes() {
        let a = ThreadComm::group(2);
        let b = ThreadComm::group(2);
        a[0].isend(1, 3, &[9]);
        b[0].isend(1, 3, &[7]);
        assert_eq!(b[1].irecv(0, 3, &mut [0u8; 1]).wait(), Some(vec![7]));
        assert_eq!(a[1].irecv(0, 3, &mut [0u8; 1]).wait(), Some(vec![9]));
    }

    #[test]
    fn nocomm_scatter_is_copy() {
        let mut out = [0.0; 3];
        NoComm
            .scatter_f64(0, Some(&[1.0, 2.0, 3.0]), &mut out)
            .unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert!(NoComm.scatter_f64(0, None, &mut out).is_err());
    }

    #[test]
    fn abort_sets_code_for_whole_group() {
        let comms = ThreadComm::group(3);
        comms[2].abort(-7);
        assert_eq!(comms[0].abort_code(), Some(-7));
        assert!(matches!(
            comms[1].barrier(),
            Err(HeatIoError::GroupAborted { code: -7 })
        ));
        assert_eq!(comms[1].collectives_issued(), 1);
    }
}
