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

//! The GPU profiler state machine.

use super::ring::Ring;
use std::collections::VecDeque;

/// The label of the implicit root scope bracketing every frame.
pub const WHOLE_FRAME_LABEL: &str = "WholeFrame";

/// Per-frame timing calibration read back from the GPU.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationData {
    /// Timestamp ticks per second.
    pub frequency_hz: f64,
    /// `true` when the timestamps of the frame are unreliable (e.g. the GPU
    /// changed clocks mid-frame). A disjoint frame is dropped entirely.
    pub disjoint: bool,
}

/// The backend operations the profiler drives.
///
/// Recording methods are called while the frame is being built; reading
/// methods are called several frames later, once the results are resident.
/// A read may block if the results are not yet available, which the
/// deferred-resolution queue keeps rare.
pub trait TimestampQueryBackend {
    /// Records a timestamp into the given slot of the timestamp ring.
    fn record_timestamp(&mut self, slot: usize);
    /// Opens the calibration interval for a frame.
    fn begin_calibration(&mut self, slot: usize);
    /// Closes the calibration interval for a frame.
    fn end_calibration(&mut self, slot: usize);
    /// Reads back the calibration of a finished frame.
    fn read_calibration(&mut self, slot: usize) -> CalibrationData;
    /// Reads back the tick value recorded into a timestamp slot.
    fn read_timestamp(&mut self, slot: usize) -> u64;
}

/// Tunables of the profiler.
#[derive(Debug, Clone, Copy)]
pub struct ProfilerConfig {
    /// How many finished frames stay queued before the oldest is resolved.
    /// Results are read `resolve_latency + 1` frames after recording, which
    /// gives the GPU time to finish without the readback stalling.
    pub resolve_latency: usize,
    /// The number of slots in the timestamp ring. Every scope consumes two
    /// slots per frame.
    pub timestamp_capacity: usize,
    /// The number of slots in the calibration ring, one per in-flight frame.
    pub calibration_capacity: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            resolve_latency: 4,
            timestamp_capacity: 64 * 1024,
            calibration_capacity: 8,
        }
    }
}

/// One node of a resolved scope tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTreeNode {
    /// The label passed to `begin_scope` (the root is [`WHOLE_FRAME_LABEL`]).
    pub label: String,
    /// GPU time between the scope's begin and end timestamps, in milliseconds.
    pub elapsed_ms: f64,
    /// The scopes nested directly inside this one, in issue order.
    pub children: Vec<ScopeTreeNode>,
}

#[derive(Debug)]
struct BeginSlot {
    label: String,
    /// The slot holding the scope's end timestamp. `None` while the scope
    /// is still open.
    end: Option<usize>,
}

#[derive(Debug)]
struct PendingFrame {
    calibration_slot: usize,
    first_slot: usize,
    slot_count: usize,
}

/// Records nested GPU timing scopes and reconstructs per-frame scope trees.
///
/// Usage per frame: `begin_frame`, any number of balanced
/// `begin_scope`/`end_scope` pairs, `end_frame`. Results appear in
/// [`last_frame_tree`] once the frame's readback has been resolved, which
/// happens [`ProfilerConfig::resolve_latency`] frames later.
///
/// Scope misuse (an `end_scope` without a begin, or open scopes left at
/// `end_frame`) is a programming error and panics.
///
/// [`last_frame_tree`]: GpuProfiler::last_frame_tree
#[derive(Debug)]
pub struct GpuProfiler {
    config: ProfilerConfig,
    timestamps: Ring,
    calibrations: Ring,
    begins: Vec<Option<BeginSlot>>,
    stack: Vec<usize>,
    pending: VecDeque<PendingFrame>,
    in_flight_slots: usize,
    frame_first_slot: Option<usize>,
    frame_slot_count: usize,
    frame_calibration: Option<usize>,
    last_tree: Option<ScopeTreeNode>,
    in_frame: bool,
}

impl GpuProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        let mut begins = Vec::with_capacity(config.timestamp_capacity);
        begins.resize_with(config.timestamp_capacity, || None);
        Self {
            timestamps: Ring::new(config.timestamp_capacity),
            calibrations: Ring::new(config.calibration_capacity),
            begins,
            stack: Vec::new(),
            pending: VecDeque::new(),
            in_flight_slots: 0,
            frame_first_slot: None,
            frame_slot_count: 0,
            frame_calibration: None,
            last_tree: None,
            in_frame: false,
            config,
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// The most recently resolved frame tree. `None` until the first frame
    /// has been resolved.
    pub fn last_frame_tree(&self) -> Option<&ScopeTreeNode> {
        self.last_tree.as_ref()
    }

    /// The number of finished frames whose results are still queued.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Opens a frame: starts the calibration interval and the implicit
    /// root scope.
    pub fn begin_frame(&mut self, backend: &mut dyn TimestampQueryBackend) {
        if self.in_frame {
            panic!("GpuProfiler::begin_frame called while a frame is already open");
        }
        let calibration_slot = self.calibrations.advance();
        if self
            .pending
            .iter()
            .any(|frame| frame.calibration_slot == calibration_slot)
        {
            panic!(
                "calibration ring exhausted: {} frames in flight exceed ProfilerConfig::calibration_capacity ({})",
                self.pending.len(),
                self.config.calibration_capacity
            );
        }
        backend.begin_calibration(calibration_slot);
        self.frame_calibration = Some(calibration_slot);
        self.frame_first_slot = None;
        self.frame_slot_count = 0;
        self.in_frame = true;
        self.begin_scope(WHOLE_FRAME_LABEL, backend);
    }

    /// Opens a nested timing scope.
    pub fn begin_scope(&mut self, label: &str, backend: &mut dyn TimestampQueryBackend) {
        if !self.in_frame {
            panic!("GpuProfiler::begin_scope called outside of a frame");
        }
        let slot = self.allocate_slot();
        backend.record_timestamp(slot);
        self.begins[slot] = Some(BeginSlot {
            label: label.to_string(),
            end: None,
        });
        self.stack.push(slot);
    }

    /// Closes the innermost open scope.
    pub fn end_scope(&mut self, backend: &mut dyn TimestampQueryBackend) {
        if !self.in_frame {
            panic!("GpuProfiler::end_scope called outside of a frame");
        }
        let Some(begin_slot) = self.stack.pop() else {
            panic!("GpuProfiler::end_scope without a matching begin_scope");
        };
        let slot = self.allocate_slot();
        backend.record_timestamp(slot);
        match &mut self.begins[begin_slot] {
            Some(begin) => begin.end = Some(slot),
            None => panic!("profiler stack referenced a vacant begin slot"),
        }
    }

    /// Closes the frame: pops the root scope, closes calibration, queues the
    /// frame, and resolves queued frames older than the configured latency.
    ///
    /// Panics if any scope besides the implicit root is still open.
    pub fn end_frame(&mut self, backend: &mut dyn TimestampQueryBackend) {
        if !self.in_frame {
            panic!("GpuProfiler::end_frame called without begin_frame");
        }
        if self.stack.len() != 1 {
            panic!(
                "unbalanced profiler scopes at end of frame: {} scope(s) still open",
                self.stack.len() - 1
            );
        }
        self.end_scope(backend);

        let Some(calibration_slot) = self.frame_calibration.take() else {
            panic!("profiler frame has no calibration interval");
        };
        backend.end_calibration(calibration_slot);

        let Some(first_slot) = self.frame_first_slot.take() else {
            panic!("profiler frame allocated no timestamp slots");
        };
        self.pending.push_back(PendingFrame {
            calibration_slot,
            first_slot,
            slot_count: self.frame_slot_count,
        });
        self.frame_slot_count = 0;
        self.in_frame = false;

        while self.pending.len() > self.config.resolve_latency {
            self.resolve_oldest(backend);
        }
    }

    fn allocate_slot(&mut self) -> usize {
        if self.in_flight_slots == self.timestamps.capacity() {
            panic!(
                "timestamp ring exhausted ({} slots); raise ProfilerConfig::timestamp_capacity or lower resolve_latency",
                self.timestamps.capacity()
            );
        }
        let slot = self.timestamps.advance();
        self.in_flight_slots += 1;
        self.frame_slot_count += 1;
        if self.frame_first_slot.is_none() {
            self.frame_first_slot = Some(slot);
        }
        slot
    }

    /// Reads back the oldest queued frame and rebuilds its scope tree.
    fn resolve_oldest(&mut self, backend: &mut dyn TimestampQueryBackend) {
        let Some(frame) = self.pending.pop_front() else {
            return;
        };

        let calibration = backend.read_calibration(frame.calibration_slot);
        if calibration.disjoint {
            log::warn!(
                "GpuProfiler: dropping disjoint frame ({} slots); GPU timestamps were unreliable",
                frame.slot_count
            );
            for slot in self.timestamps.indices(frame.first_slot, frame.slot_count) {
                self.begins[slot] = None;
            }
            self.in_flight_slots -= frame.slot_count;
            return;
        }

        // Walk the frame's slots in issue order. A begin slot opens a child
        // of the current node; a slot equal to the current node's recorded
        // end closes it and pops back to the parent.
        struct Building {
            node: ScopeTreeNode,
            end_slot: usize,
        }
        let mut building: Vec<Building> = Vec::new();
        let mut root: Option<ScopeTreeNode> = None;

        for slot in self.timestamps.indices(frame.first_slot, frame.slot_count) {
            if building.last().is_some_and(|top| top.end_slot == slot) {
                let done = match building.pop() {
                    Some(done) => done,
                    None => unreachable!(),
                };
                match building.last_mut() {
                    Some(parent) => parent.node.children.push(done.node),
                    None => {
                        if root.is_some() {
                            panic!("profiler frame closed a scope past the root");
                        }
                        root = Some(done.node);
                    }
                }
            } else if let Some(begin) = self.begins[slot].take() {
                let Some(end_slot) = begin.end else {
                    panic!("scope '{}' was never closed", begin.label);
                };
                let begin_ticks = backend.read_timestamp(slot);
                let end_ticks = backend.read_timestamp(end_slot);
                let elapsed_ms =
                    end_ticks.wrapping_sub(begin_ticks) as f64 / calibration.frequency_hz * 1000.0;
                building.push(Building {
                    node: ScopeTreeNode {
                        label: begin.label,
                        elapsed_ms,
                        children: Vec::new(),
                    },
                    end_slot,
                });
            } else {
                panic!("timestamp slot {slot} belongs to no recorded scope");
            }
        }

        if !building.is_empty() {
            panic!(
                "profiler frame ended with {} unclosed scope(s) in its slot range",
                building.len()
            );
        }
        self.in_flight_slots -= frame.slot_count;

        let Some(root) = root else {
            panic!("profiler frame resolved to no scope tree");
        };
        self.last_tree = Some(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Deterministic backend: every recorded timestamp advances a fake
    /// clock by a fixed number of ticks.
    struct FakeBackend {
        now: u64,
        step: u64,
        frequency_hz: f64,
        recorded: HashMap<usize, u64>,
        disjoint_calibrations: Vec<usize>,
        calibration_reads: usize,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                now: 1_000,
                step: 100,
                frequency_hz: 1_000_000.0, // 100 ticks = 0.1 ms
                recorded: HashMap::new(),
                disjoint_calibrations: Vec::new(),
                calibration_reads: 0,
            }
        }
    }

    impl TimestampQueryBackend for FakeBackend {
        fn record_timestamp(&mut self, slot: usize) {
            self.recorded.insert(slot, self.now);
            self.now += self.step;
        }

        fn begin_calibration(&mut self, _slot: usize) {}

        fn end_calibration(&mut self, _slot: usize) {}

        fn read_calibration(&mut self, slot: usize) -> CalibrationData {
            self.calibration_reads += 1;
            CalibrationData {
                frequency_hz: self.frequency_hz,
                disjoint: self.disjoint_calibrations.contains(&slot),
            }
        }

        fn read_timestamp(&mut self, slot: usize) -> u64 {
            self.recorded[&slot]
        }
    }

    fn config(latency: usize) -> ProfilerConfig {
        ProfilerConfig {
            resolve_latency: latency,
            timestamp_capacity: 256,
            calibration_capacity: 8,
        }
    }

    fn run_empty_frame(profiler: &mut GpuProfiler, backend: &mut FakeBackend) {
        profiler.begin_frame(backend);
        profiler.end_frame(backend);
    }

    #[test]
    fn no_tree_until_latency_exceeded() {
        let mut profiler = GpuProfiler::new(config(4));
        let mut backend = FakeBackend::new();

        for _ in 0..4 {
            run_empty_frame(&mut profiler, &mut backend);
        }
        assert!(profiler.last_frame_tree().is_none());
        assert_eq!(profiler.pending_frames(), 4);

        run_empty_frame(&mut profiler, &mut backend);
        assert!(profiler.last_frame_tree().is_some());
        assert_eq!(profiler.pending_frames(), 4);
    }

    #[test]
    fn resolved_tree_matches_scope_nesting() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();

        profiler.begin_frame(&mut backend);
        profiler.begin_scope("Shadows", &mut backend);
        profiler.begin_scope("Cascade0", &mut backend);
        profiler.end_scope(&mut backend);
        profiler.end_scope(&mut backend);
        profiler.begin_scope("MainPass", &mut backend);
        profiler.end_scope(&mut backend);
        profiler.end_frame(&mut backend);

        let root = profiler.last_frame_tree().unwrap();
        assert_eq!(root.label, WHOLE_FRAME_LABEL);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].label, "Shadows");
        assert_eq!(root.children[0].children.len(), 1);
        assert_eq!(root.children[0].children[0].label, "Cascade0");
        assert_eq!(root.children[1].label, "MainPass");
        assert!(root.children[1].children.is_empty());

        // The root brackets everything, so it must be the longest scope.
        assert!(root.elapsed_ms > root.children[0].elapsed_ms);
        assert!(root.children[0].elapsed_ms > root.children[0].children[0].elapsed_ms);
    }

    #[test]
    fn elapsed_uses_frequency() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();

        // Root scope: begin at t, end after 3 further records (one scope in
        // between plus the root end). With 100 ticks per record and a 1 MHz
        // clock, the inner scope spans exactly 100 ticks = 0.1 ms.
        profiler.begin_frame(&mut backend);
        profiler.begin_scope("Inner", &mut backend);
        profiler.end_scope(&mut backend);
        profiler.end_frame(&mut backend);

        let root = profiler.last_frame_tree().unwrap();
        let inner = &root.children[0];
        assert!((inner.elapsed_ms - 0.1).abs() < 1e-9);
        assert!((root.elapsed_ms - 0.3).abs() < 1e-9);
    }

    #[test]
    fn disjoint_frame_is_dropped() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();
        backend.disjoint_calibrations.push(0); // first frame's calibration slot

        run_empty_frame(&mut profiler, &mut backend);
        assert!(profiler.last_frame_tree().is_none());

        run_empty_frame(&mut profiler, &mut backend);
        assert!(profiler.last_frame_tree().is_some());
    }

    #[test]
    fn tree_is_replaced_by_each_resolution() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();

        profiler.begin_frame(&mut backend);
        profiler.begin_scope("First", &mut backend);
        profiler.end_scope(&mut backend);
        profiler.end_frame(&mut backend);
        assert_eq!(profiler.last_frame_tree().unwrap().children[0].label, "First");

        profiler.begin_frame(&mut backend);
        profiler.begin_scope("Second", &mut backend);
        profiler.end_scope(&mut backend);
        profiler.end_frame(&mut backend);
        assert_eq!(
            profiler.last_frame_tree().unwrap().children[0].label,
            "Second"
        );
    }

    #[test]
    fn slot_ring_wraps_across_frames() {
        // 16 slots, 6 per frame (root + 2 scopes); three frames force a wrap.
        let mut profiler = GpuProfiler::new(ProfilerConfig {
            resolve_latency: 0,
            timestamp_capacity: 16,
            calibration_capacity: 4,
        });
        let mut backend = FakeBackend::new();

        for frame in 0..3 {
            profiler.begin_frame(&mut backend);
            profiler.begin_scope("A", &mut backend);
            profiler.end_scope(&mut backend);
            profiler.begin_scope("B", &mut backend);
            profiler.end_scope(&mut backend);
            profiler.end_frame(&mut backend);

            let root = profiler.last_frame_tree().unwrap();
            assert_eq!(root.children.len(), 2, "frame {frame}");
            assert_eq!(root.children[0].label, "A");
            assert_eq!(root.children[1].label, "B");
        }
    }

    #[test]
    #[should_panic(expected = "without a matching begin_scope")]
    fn end_scope_past_root_panics() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();
        profiler.begin_frame(&mut backend);
        profiler.end_scope(&mut backend); // closes the implicit root
        profiler.end_scope(&mut backend);
    }

    #[test]
    #[should_panic(expected = "unbalanced profiler scopes")]
    fn open_scope_at_end_frame_panics() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();
        profiler.begin_frame(&mut backend);
        profiler.begin_scope("Left open", &mut backend);
        profiler.end_frame(&mut backend);
    }

    #[test]
    #[should_panic(expected = "already open")]
    fn nested_begin_frame_panics() {
        let mut profiler = GpuProfiler::new(config(0));
        let mut backend = FakeBackend::new();
        profiler.begin_frame(&mut backend);
        profiler.begin_frame(&mut backend);
    }

    #[test]
    #[should_panic(expected = "timestamp ring exhausted")]
    fn slot_exhaustion_panics() {
        // Each empty frame holds two slots; with latency 2 the first two
        // frames stay queued, so the third exceeds a 4-slot ring.
        let mut profiler = GpuProfiler::new(ProfilerConfig {
            resolve_latency: 2,
            timestamp_capacity: 4,
            calibration_capacity: 8,
        });
        let mut backend = FakeBackend::new();
        for _ in 0..3 {
            run_empty_frame(&mut profiler, &mut backend);
        }
    }

    #[test]
    fn calibration_read_happens_once_per_resolved_frame() {
        let mut profiler = GpuProfiler::new(config(1));
        let mut backend = FakeBackend::new();
        for _ in 0..5 {
            run_empty_frame(&mut profiler, &mut backend);
        }
        assert_eq!(backend.calibration_reads, 4);
    }
}
