// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use aurora_core::renderer::profiling::{CalibrationData, ProfilerConfig};

/// Queries per `wgpu::QuerySet`. Kept well under wgpu's per-set maximum so
/// the pool can grow in modest chunks.
const QUERIES_PER_SET: usize = 2048;

/// A frame's worth of timestamp readback state, keyed by its calibration slot.
#[derive(Debug)]
struct FrameCapture {
    staging: wgpu::Buffer,
    /// Keeps the resolve destination alive until the staging copy has executed.
    _resolve: wgpu::Buffer,
    ready: Arc<AtomicBool>,
    scheduled: bool,
    /// The timestamp slots captured in this frame, in staging-buffer order.
    slots: Vec<usize>,
}

/// Backs the profiler's abstract timestamp slots with `wgpu::QuerySet`s.
///
/// Timestamp ring slots map onto a growing list of fixed-size query sets
/// (slot / [`QUERIES_PER_SET`] selects the set, the remainder the index).
/// The calibration interval of a frame brackets its slots: `end_calibration`
/// resolves everything recorded since `begin_calibration` into a staging
/// buffer, and `read_calibration` blocks on that buffer only if the map has
/// not completed yet.
#[derive(Debug)]
pub struct WgpuQueryPool {
    device: wgpu::Device,
    queue: wgpu::Queue,
    query_sets: Vec<wgpu::QuerySet>,
    frequency_hz: f64,
    /// Slots recorded since `begin_calibration`, in issue order.
    frame_slots: Vec<usize>,
    collecting: bool,
    /// One pending capture per calibration slot.
    captures: Vec<Option<FrameCapture>>,
    /// Tick values parsed out of finished captures, consumed by `read_timestamp`.
    resolved: HashMap<usize, u64>,
}

impl WgpuQueryPool {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, config: &ProfilerConfig) -> Self {
        // get_timestamp_period is in nanoseconds per tick.
        let period_ns = queue.get_timestamp_period() as f64;
        let frequency_hz = 1.0e9 / period_ns;
        log::info!(
            "WgpuQueryPool: timestamp period {period_ns:.3} ns ({frequency_hz:.0} Hz), \
             {} calibration slots",
            config.calibration_capacity
        );

        let mut captures = Vec::with_capacity(config.calibration_capacity);
        captures.resize_with(config.calibration_capacity, || None);

        Self {
            device,
            queue,
            query_sets: Vec::new(),
            frequency_hz,
            frame_slots: Vec::new(),
            collecting: false,
            captures,
            resolved: HashMap::new(),
        }
    }

    fn ensure_query_set(&mut self, slot: usize) {
        let set_index = slot / QUERIES_PER_SET;
        while self.query_sets.len() <= set_index {
            let label = format!("Aurora Timestamp QuerySet {}", self.query_sets.len());
            self.query_sets
                .push(self.device.create_query_set(&wgpu::QuerySetDescriptor {
                    label: Some(&label),
                    ty: wgpu::QueryType::Timestamp,
                    count: QUERIES_PER_SET as u32,
                }));
            log::debug!("WgpuQueryPool: grew to {} query sets", self.query_sets.len());
        }
    }

    /// Writes a timestamp for the given slot into the current encoder.
    /// Requires `Features::TIMESTAMP_QUERY_INSIDE_ENCODERS` on the device.
    pub fn write_timestamp(&mut self, encoder: &mut wgpu::CommandEncoder, slot: usize) {
        self.ensure_query_set(slot);
        let set = &self.query_sets[slot / QUERIES_PER_SET];
        encoder.write_timestamp(set, (slot % QUERIES_PER_SET) as u32);
        if self.collecting {
            self.frame_slots.push(slot);
        }
    }

    /// Opens the calibration interval: timestamps written from here belong to
    /// the frame using this calibration slot.
    pub fn begin_calibration(&mut self, slot: usize) {
        if let Some(stale) = self.captures.get_mut(slot).and_then(Option::take) {
            // The profiler only reuses a calibration slot after resolving its
            // frame, so a leftover capture means a frame was dropped.
            log::warn!(
                "WgpuQueryPool: discarding stale capture in calibration slot {slot} ({} slots)",
                stale.slots.len()
            );
        }
        self.frame_slots.clear();
        self.collecting = true;
    }

    /// Closes the calibration interval and records the resolve+copy commands
    /// that move this frame's timestamps into a mappable staging buffer.
    pub fn end_calibration(&mut self, slot: usize, encoder: &mut wgpu::CommandEncoder) {
        self.collecting = false;
        if slot >= self.captures.len() {
            log::error!("WgpuQueryPool: calibration slot {slot} out of range");
            return;
        }
        if self.frame_slots.is_empty() {
            return;
        }
        let slots = std::mem::take(&mut self.frame_slots);

        // resolve_query_set needs contiguous indices within one set, and a
        // 256-aligned destination offset. Split the frame's slots into runs
        // of consecutive slots that share a set, then lay the runs out at
        // aligned offsets in the resolve buffer.
        let mut runs: Vec<(usize, usize)> = Vec::new(); // (first slot, count)
        for &s in &slots {
            match runs.last_mut() {
                Some((first, count))
                    if *first + *count == s
                        && s / QUERIES_PER_SET == *first / QUERIES_PER_SET =>
                {
                    *count += 1;
                }
                _ => runs.push((s, 1)),
            }
        }

        let align = wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT;
        let mut resolve_offsets = Vec::with_capacity(runs.len());
        let mut resolve_size = 0u64;
        for &(_, count) in &runs {
            resolve_offsets.push(resolve_size);
            let run_bytes = count as u64 * 8;
            resolve_size += run_bytes.div_ceil(align) * align;
        }

        let resolve = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Aurora Timestamp Resolve Buffer"),
            size: resolve_size,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Aurora Timestamp Staging Buffer"),
            size: slots.len() as u64 * 8,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut staging_offset = 0u64;
        for (&(first, count), &resolve_offset) in runs.iter().zip(&resolve_offsets) {
            let set = &self.query_sets[first / QUERIES_PER_SET];
            let start = (first % QUERIES_PER_SET) as u32;
            encoder.resolve_query_set(set, start..start + count as u32, &resolve, resolve_offset);
            let run_bytes = count as u64 * 8;
            encoder.copy_buffer_to_buffer(&resolve, resolve_offset, &staging, staging_offset, run_bytes);
            staging_offset += run_bytes;
        }

        self.captures[slot] = Some(FrameCapture {
            staging,
            _resolve: resolve,
            ready: Arc::new(AtomicBool::new(false)),
            scheduled: false,
            slots,
        });
    }

    /// Kicks off the asynchronous map of every capture whose commands have
    /// been submitted. Call once per frame, after `queue.submit`.
    pub fn schedule_maps(&mut self) {
        for capture in self.captures.iter_mut().flatten() {
            if capture.scheduled {
                continue;
            }
            let flag = capture.ready.clone();
            capture.staging.slice(..).map_async(wgpu::MapMode::Read, move |res| {
                if let Err(e) = res {
                    log::error!("WgpuQueryPool: staging map_async failed: {e:?}");
                }
                flag.store(true, Ordering::SeqCst);
            });
            capture.scheduled = true;
        }
    }

    /// Reads back the calibration of a finished frame, blocking on the GPU if
    /// its staging buffer is not mapped yet. The frame's timestamps become
    /// available to `read_timestamp` afterwards.
    ///
    /// wgpu timestamps share one monotonic clock, so there is no analogue of
    /// a disjoint frame; `disjoint` is always `false` here.
    pub fn read_calibration(&mut self, slot: usize) -> CalibrationData {
        let data = CalibrationData {
            frequency_hz: self.frequency_hz,
            disjoint: false,
        };
        let Some(capture) = self.captures.get_mut(slot).and_then(Option::take) else {
            log::warn!("WgpuQueryPool: no capture pending in calibration slot {slot}");
            return data;
        };

        if !capture.scheduled {
            // Should have been scheduled by schedule_maps after submit.
            let flag = capture.ready.clone();
            capture.staging.slice(..).map_async(wgpu::MapMode::Read, move |res| {
                if let Err(e) = res {
                    log::error!("WgpuQueryPool: staging map_async failed: {e:?}");
                }
                flag.store(true, Ordering::SeqCst);
            });
        }
        while !capture.ready.load(Ordering::SeqCst) {
            if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
                log::error!("WgpuQueryPool: device poll failed during readback: {e:?}");
                return data;
            }
        }

        {
            let mapped = capture.staging.slice(..).get_mapped_range();
            for (i, &s) in capture.slots.iter().enumerate() {
                let ticks = u64::from_le_bytes(
                    mapped[i * 8..i * 8 + 8]
                        .try_into()
                        .unwrap_or([0; 8]),
                );
                self.resolved.insert(s, ticks);
            }
        }
        capture.staging.unmap();
        data
    }

    /// Returns the tick value of a slot resolved by the last `read_calibration`.
    pub fn read_timestamp(&mut self, slot: usize) -> u64 {
        self.resolved.remove(&slot).unwrap_or_else(|| {
            log::warn!("WgpuQueryPool: timestamp slot {slot} was never resolved");
            0
        })
    }

    /// Drains all in-flight readbacks. Called on shutdown so no mapped buffer
    /// is dropped while its callback is still outstanding.
    pub fn shutdown(&mut self) {
        log::debug!("Shutting down WgpuQueryPool...");
        if let Err(e) = self.device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("WgpuQueryPool: poll during shutdown failed: {e:?}");
        }
        for (slot, capture) in self.captures.iter_mut().enumerate() {
            if let Some(capture) = capture.take() {
                if capture.scheduled {
                    log::warn!(
                        "WgpuQueryPool: capture in slot {slot} still pending at shutdown, unmapping."
                    );
                    capture.staging.unmap();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper function to create a wgpu Device and Queue for testing purposes.
    // Returns None if a suitable adapter cannot be found.
    fn create_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .ok()?;

        let features = adapter.features();
        let wanted = wgpu::Features::TIMESTAMP_QUERY
            .union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);
        if !features.contains(wanted) {
            return None;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Aurora Test Device"),
            required_features: wanted,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .ok()?;

        Some((device, queue))
    }

    #[test]
    fn pool_reports_a_sane_frequency_or_skips() {
        let (device, queue) = match create_test_device() {
            Some(v) => v,
            None => {
                println!("Skipping query pool test: no device with timestamp support.");
                return;
            }
        };

        let pool = WgpuQueryPool::new(device, queue, &ProfilerConfig::default());
        assert!(pool.frequency_hz > 0.0);
        assert!(pool.query_sets.is_empty());
    }

    #[test]
    fn full_capture_cycle_resolves_monotonic_ticks_or_skips() {
        let (device, queue) = match create_test_device() {
            Some(v) => v,
            None => {
                println!("Skipping query pool test: no device with timestamp support.");
                return;
            }
        };

        let mut pool = WgpuQueryPool::new(device.clone(), queue.clone(), &ProfilerConfig::default());
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        pool.begin_calibration(0);
        pool.write_timestamp(&mut encoder, 0);
        pool.write_timestamp(&mut encoder, 1);
        pool.end_calibration(0, &mut encoder);

        queue.submit(std::iter::once(encoder.finish()));
        pool.schedule_maps();

        let calibration = pool.read_calibration(0);
        assert!(!calibration.disjoint);
        let begin = pool.read_timestamp(0);
        let end = pool.read_timestamp(1);
        assert!(end >= begin);
    }

    #[test]
    fn reading_an_empty_slot_yields_default_calibration_or_skips() {
        let (device, queue) = match create_test_device() {
            Some(v) => v,
            None => {
                println!("Skipping query pool test: no device with timestamp support.");
                return;
            }
        };

        let mut pool = WgpuQueryPool::new(device, queue, &ProfilerConfig::default());
        let calibration = pool.read_calibration(3);
        assert!(!calibration.disjoint);
        assert_eq!(pool.read_timestamp(42), 0);
    }
}
