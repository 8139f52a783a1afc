//! POSIX shared-memory and named-semaphore primitives backing the MTP socket table and control
//! record, and the two-phase rendezvous protocol clients use to ask the daemon for a UDP socket.
//!
//! The original implementation keyed its System V `shmget`/`semget` segments off `ftok`. This
//! reimplementation uses the POSIX `shm_open`/`sem_open` families instead: equally portable on
//! any Unix this targets, and immune to `ftok`'s path+id key-collision hazard.

mod naming;
mod region;
mod sem;
mod shm;

pub use region::Region;
pub use sem::NamedSemaphore;
pub use shm::ShmSegment;
