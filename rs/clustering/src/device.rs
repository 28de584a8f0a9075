//! Compute devices. A device owns a worker pool and processes a contiguous shard of the input.
//!
//! Work is always cut into blocks of [`BLOCK_ROWS`] rows, independently of how many devices
//! there are, and per-block results are handed back in block order. Any reduction the caller
//! performs over those results is therefore identical for one device or many.

use std::ops::Range;

use anyhow::{anyhow, Result};
use log::debug;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};

pub const BLOCK_ROWS: usize = 1024;

pub struct Device {
    id: usize,
    pool: ThreadPool,
}

impl Device {
    fn new(id: usize, num_threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |idx| format!("device-{}-worker-{}", id, idx))
            .build()?;
        Ok(Self { id, pool })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn run_blocks<R, F>(&self, blocks: Range<usize>, num_rows: usize, f: &F) -> Vec<R>
    where
        R: Send,
        F: Fn(Range<usize>) -> R + Sync,
    {
        self.pool.install(|| {
            blocks
                .into_par_iter()
                .map(|block| f(block_rows(block, num_rows)))
                .collect()
        })
    }
}

fn block_rows(block: usize, num_rows: usize) -> Range<usize> {
    block * BLOCK_ROWS..((block + 1) * BLOCK_ROWS).min(num_rows)
}

pub fn num_blocks(num_rows: usize) -> usize {
    num_rows.div_ceil(BLOCK_ROWS)
}

pub struct DeviceSet {
    devices: Vec<Device>,
}

impl DeviceSet {
    /// Creates `num_devices` devices (all available ones with `None`). Available threads are
    /// split evenly between devices, with at least one thread each.
    pub fn new(num_devices: Option<usize>) -> Result<Self> {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let num_devices = num_devices.unwrap_or(available);
        if num_devices == 0 {
            return Err(anyhow!("Need at least one device"));
        }

        let threads_per_device = (available / num_devices).max(1);
        let devices = (0..num_devices)
            .map(|id| Device::new(id, threads_per_device))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Created {} devices with {} threads each",
            num_devices, threads_per_device
        );
        Ok(Self { devices })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Which blocks each device handles: contiguous, near-equal runs.
    fn shards(&self, num_blocks: usize) -> Vec<Range<usize>> {
        let per_device = num_blocks.div_ceil(self.devices.len()).max(1);
        (0..self.devices.len())
            .map(|idx| {
                let start = (idx * per_device).min(num_blocks);
                let end = ((idx + 1) * per_device).min(num_blocks);
                start..end
            })
            .collect()
    }

    /// Runs `f` on every block of `0..num_rows` and returns the results in block order.
    pub fn map_blocks<R, F>(&self, num_rows: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(Range<usize>) -> R + Sync,
    {
        let shards = self.shards(num_blocks(num_rows));
        if self.devices.len() == 1 {
            return self.devices[0].run_blocks(shards[0].clone(), num_rows, &f);
        }

        let f = &f;
        std::thread::scope(|scope| {
            let handles = self
                .devices
                .iter()
                .zip(shards)
                .filter(|(_, shard)| !shard.is_empty())
                .map(|(device, shard)| scope.spawn(move || device.run_blocks(shard, num_rows, f)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }
}
