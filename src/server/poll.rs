//! Bitmask descriptor sets and a readiness wait on top of `poll(2)`.
//!
//! The contract is the classic `select` one: the caller fills a read set
//! and a write set with the descriptors it is interested in, waits, and
//! gets the same sets back holding only the descriptors that are ready.
//! Any readiness API that reports per-descriptor read/write readiness could
//! sit behind [`Readiness::wait`]; the pool only ever touches the sets.

use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use libc::{POLLERR, POLLHUP, POLLIN, POLLOUT, c_int, nfds_t, pollfd};

const WORD_BITS: usize = u64::BITS as usize;

/// A set of descriptors stored as a bitmask indexed by descriptor number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdSet {
    words: Vec<u64>,
}

impl FdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `fd`. Negative descriptors are ignored.
    pub fn insert(&mut self, fd: RawFd) {
        let Ok(fd) = usize::try_from(fd) else {
            return;
        };
        let word = fd / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (fd % WORD_BITS);
    }

    pub fn remove(&mut self, fd: RawFd) {
        let Ok(fd) = usize::try_from(fd) else {
            return;
        };
        if let Some(word) = self.words.get_mut(fd / WORD_BITS) {
            *word &= !(1 << (fd % WORD_BITS));
        }
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        let Ok(fd) = usize::try_from(fd) else {
            return false;
        };
        self.words
            .get(fd / WORD_BITS)
            .is_some_and(|word| word & (1 << (fd % WORD_BITS)) != 0)
    }

    /// Removes every descriptor, keeping the allocation.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Descriptors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.words.iter().enumerate().flat_map(|(i, word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| (i * WORD_BITS + bit) as RawFd)
        })
    }
}

/// Read and write interest sets, rewritten in place by [`wait`](Self::wait).
#[derive(Default)]
pub struct Readiness {
    pub readers: FdSet,
    pub writers: FdSet,
    /// Reused across waits.
    pollfds: Vec<pollfd>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.readers.clear();
        self.writers.clear();
    }

    /// Blocks until a registered descriptor is ready or `timeout` elapses.
    ///
    /// `max_fd` bounds the scan of both sets; `None` means nothing is
    /// registered and the call just sleeps. On return the sets hold only
    /// ready descriptors. A hang-up or error is reported as readiness for
    /// whatever the descriptor was registered for, so the following read or
    /// write surfaces it. Returns the number of ready descriptors; an
    /// interrupted wait counts as a timeout.
    pub fn wait(&mut self, max_fd: Option<RawFd>, timeout: Duration) -> io::Result<usize> {
        self.pollfds.clear();

        if let Some(max_fd) = max_fd {
            for fd in 0..=max_fd {
                let mut events = 0;
                if self.readers.contains(fd) {
                    events |= POLLIN;
                }
                if self.writers.contains(fd) {
                    events |= POLLOUT;
                }
                if events != 0 {
                    self.pollfds.push(pollfd {
                        fd,
                        events,
                        revents: 0,
                    });
                }
            }
        }

        let rc = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as nfds_t,
                timeout_millis(timeout),
            )
        };

        self.clear();

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        let mut ready = 0;
        for p in &self.pollfds {
            if p.revents == 0 {
                continue;
            }
            ready += 1;
            if p.events & POLLIN != 0 && p.revents & (POLLIN | POLLHUP | POLLERR) != 0 {
                self.readers.insert(p.fd);
            }
            if p.events & POLLOUT != 0 && p.revents & (POLLOUT | POLLHUP | POLLERR) != 0 {
                self.writers.insert(p.fd);
            }
        }

        Ok(ready)
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readiness")
            .field("readers", &self.readers.iter().collect::<Vec<_>>())
            .field("writers", &self.writers.iter().collect::<Vec<_>>())
            .finish()
    }
}

/// Rounds up so that a sub-millisecond timeout still sleeps.
fn timeout_millis(timeout: Duration) -> c_int {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(c_int::MAX as u128) as c_int
}
