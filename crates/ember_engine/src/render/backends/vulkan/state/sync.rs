//! Queue synchronization state
//!
//! One timeline semaphore tracks GPU progress: every submitted frame signals
//! it with the next value of a monotonically increasing counter. Two binary
//! semaphores complete the acquire → submit → present chain:
//!
//! ```text
//! acquire ──(spare)──▶ submit ──(present)──▶ present
//!                         │
//!                         └──(timeline = progress + 1)
//! ```
//!
//! The spare semaphore receives the next image's ready signal before the
//! image index is known, and is then exchanged with the acquire semaphore of
//! the slot the index names.

use ash::vk;

use crate::render::backends::vulkan::backend::GpuBackend;
use crate::render::backends::vulkan::initialization::error::VulkanResult;

/// Progress counter and the semaphores that sequence a frame
#[derive(Debug)]
pub struct QueueSync {
    timeline: vk::Semaphore,
    present: vk::Semaphore,
    spare: vk::Semaphore,
    progress: u64,
}

impl QueueSync {
    /// Create the timeline (starting at 0), present and spare semaphores
    ///
    /// On failure every semaphore created so far is destroyed again.
    pub fn new<B: GpuBackend>(backend: &B) -> VulkanResult<Self> {
        let mut sync = Self {
            timeline: vk::Semaphore::null(),
            present: vk::Semaphore::null(),
            spare: vk::Semaphore::null(),
            progress: 0,
        };

        let created = (|| -> VulkanResult<()> {
            sync.timeline = backend.create_timeline_semaphore(0)?;
            sync.present = backend.create_semaphore()?;
            sync.spare = backend.create_semaphore()?;
            Ok(())
        })();

        if let Err(err) = created {
            sync.destroy(backend);
            return Err(err);
        }

        log::debug!("[SYNC] Queue synchronization created");
        Ok(sync)
    }

    /// Timeline semaphore signaled with the progress counter
    pub fn timeline(&self) -> vk::Semaphore {
        self.timeline
    }

    /// Binary semaphore between submit and present
    pub fn present(&self) -> vk::Semaphore {
        self.present
    }

    /// Semaphore the next acquisition will signal
    pub fn spare(&self) -> vk::Semaphore {
        self.spare
    }

    /// Swap the spare semaphore with `slot_semaphore`
    ///
    /// After the call `slot_semaphore` holds the semaphore the last
    /// acquisition signaled and the spare holds the slot's previous one.
    pub fn exchange_spare(&mut self, slot_semaphore: &mut vk::Semaphore) {
        std::mem::swap(&mut self.spare, slot_semaphore);
    }

    /// Number of frames submitted so far
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Value the next submission will signal
    pub fn next_value(&self) -> u64 {
        self.progress + 1
    }

    /// Record a successful submission and return the new counter value
    pub fn advance(&mut self) -> u64 {
        self.progress += 1;
        self.progress
    }

    /// Destroy all semaphores; safe on a partially created state
    pub fn destroy<B: GpuBackend>(&mut self, backend: &B) {
        for semaphore in [&mut self.timeline, &mut self.present, &mut self.spare] {
            if *semaphore != vk::Semaphore::null() {
                backend.destroy_semaphore(*semaphore);
                *semaphore = vk::Semaphore::null();
            }
        }
    }
}
