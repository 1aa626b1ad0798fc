//! Attribute engine
//!
//! Turns bounding surfaces into attribute maps:
//!
//! 1. Validate the window and request parameters
//! 2. Ask the data source for a sub-volume descriptor
//! 3. Split the grid into chunks and run them on a bounded worker pool,
//!    each writing its own slice of one shared output buffer
//! 4. Report the first failing chunk in dispatch order, or hand back one
//!    little-endian `f32` map per attribute
//!
//! Chunks are never cancelled. Once dispatched, every chunk runs to completion
//! before an error is reported.

pub mod partition;

pub use partition::{Capacity, ChunkPlan};

use crate::attribute::{AttributeKind, Interpolation};
use crate::error::{VdsError, VdsResult};
use crate::request::MAX_WINDOW_EXTENT;
use crate::surface::RegularSurface;
use crate::volume::{resampling_step, DataSource, SubVolume, MAX_WINDOW_SAMPLES};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Shared, bounded compute engine
pub struct AttributeEngine {
    capacity: Capacity,
    pool: ThreadPool,
}

impl AttributeEngine {
    pub fn new(capacity: Capacity) -> VdsResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(capacity.workers())
            .thread_name(|i| format!("vdsattr-worker-{}", i))
            .build()
            .map_err(|e| VdsError::internal(format!("Failed to start worker pool: {}", e)))?;

        Ok(Self { capacity, pool })
    }

    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    /// Attributes in a window of `above`/`below` around one surface
    #[allow(clippy::too_many_arguments)]
    pub fn along_surface(
        &self,
        source: &dyn DataSource,
        surface: &RegularSurface,
        above: f32,
        below: f32,
        stepsize: f32,
        attributes: &[AttributeKind],
        interpolation: Interpolation,
    ) -> VdsResult<Vec<Vec<u8>>> {
        validate_window(above, below)?;
        validate_stepsize(stepsize)?;

        let top = surface.shifted(-above);
        let bottom = surface.shifted(below);
        self.compute(source, surface, &top, &bottom, attributes, interpolation, stepsize)
    }

    /// Attributes in the window bounded by two surfaces, with `primary` as
    /// the reference
    pub fn between_surfaces(
        &self,
        source: &dyn DataSource,
        primary: &RegularSurface,
        secondary: &RegularSurface,
        stepsize: f32,
        attributes: &[AttributeKind],
        interpolation: Interpolation,
    ) -> VdsResult<Vec<Vec<u8>>> {
        validate_stepsize(stepsize)?;

        let alignment = source.align_surfaces(primary, secondary)?;
        let (top, bottom) = if alignment.primary_is_top {
            (primary, &alignment.aligned)
        } else {
            (&alignment.aligned, primary)
        };
        self.compute(source, primary, top, bottom, attributes, interpolation, stepsize)
    }

    /// Run the chunked computation over prepared bounding surfaces
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        source: &dyn DataSource,
        reference: &RegularSurface,
        top: &RegularSurface,
        bottom: &RegularSurface,
        attributes: &[AttributeKind],
        interpolation: Interpolation,
        stepsize: f32,
    ) -> VdsResult<Vec<Vec<u8>>> {
        validate_stepsize(stepsize)?;
        if attributes.is_empty() {
            return Err(VdsError::invalid("At least one attribute must be requested"));
        }
        if !source.supports(interpolation) {
            return Err(VdsError::invalid(format!(
                "Interpolation method '{}' is not supported by this data source",
                interpolation
            )));
        }

        let hsize = reference.size();
        if hsize == 0 {
            return Err(VdsError::invalid("Surface grid is empty"));
        }
        if top.size() != hsize || bottom.size() != hsize {
            return Err(VdsError::invalid(
                "Reference, top and bottom surfaces must have the same number of cells",
            ));
        }

        let subvolume = source.build_subvolume(reference, top, bottom)?;
        if subvolume.size() != hsize {
            return Err(VdsError::internal(format!(
                "Sub-volume describes {} cells, grid has {}",
                subvolume.size(),
                hsize
            )));
        }
        let step = resampling_step(stepsize, &source.metadata().sample);
        check_window_lengths(&subvolume, reference, step)?;

        let plan = ChunkPlan::new(hsize, &self.capacity);
        debug!(
            cells = hsize,
            samples = subvolume.nsamples(),
            chunks = plan.len(),
            chunk_size = plan.chunk_size(),
            workers = plan.active_workers(self.pool.current_num_threads()),
            "Dispatching attribute computation"
        );

        let mut buffer = vec![0f32; hsize * attributes.len()];
        let mut work: Vec<(Range<usize>, Vec<&mut [f32]>)> = plan
            .ranges()
            .map(|cells| (cells, Vec::with_capacity(attributes.len())))
            .collect();
        for map in buffer.chunks_mut(hsize) {
            for ((_, outputs), piece) in work.iter_mut().zip(map.chunks_mut(plan.chunk_size())) {
                outputs.push(piece);
            }
        }

        let outcomes: Vec<VdsResult<()>> = self.pool.install(|| {
            work.into_par_iter()
                .map(|(cells, mut outputs)| {
                    run_chunk(
                        source,
                        &subvolume,
                        interpolation,
                        attributes,
                        stepsize,
                        cells,
                        &mut outputs,
                    )
                })
                .collect()
        });

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        if failed > 0 {
            debug!(failed, chunks = outcomes.len(), "Attribute computation failed");
        }
        outcomes.into_iter().collect::<VdsResult<Vec<()>>>()?;

        Ok(buffer
            .chunks(hsize)
            .map(|map| map.iter().flat_map(|v| v.to_le_bytes()).collect())
            .collect())
    }
}

/// Run one chunk, turning a panic into an error
fn run_chunk(
    source: &dyn DataSource,
    subvolume: &SubVolume,
    interpolation: Interpolation,
    attributes: &[AttributeKind],
    stepsize: f32,
    cells: Range<usize>,
    outputs: &mut [&mut [f32]],
) -> VdsResult<()> {
    let start = cells.start;
    panic::catch_unwind(AssertUnwindSafe(|| {
        source.compute_attribute_chunk(subvolume, interpolation, attributes, stepsize, cells, outputs)
    }))
    .unwrap_or_else(|payload| {
        Err(VdsError::internal(format!(
            "Worker panicked on chunk starting at cell {}: {}",
            start,
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Reject windows that resample into more than [`MAX_WINDOW_SAMPLES`]
fn check_window_lengths(
    subvolume: &SubVolume,
    reference: &RegularSurface,
    step: f64,
) -> VdsResult<()> {
    for i in 0..subvolume.size() {
        let Some(cell) = subvolume.cell(i) else {
            continue;
        };
        if cell.steps(step).is_none() {
            let (row, col) = reference.row_col(i);
            return Err(VdsError::invalid(format!(
                "Stepsize {} gives more than {} samples in the window at row: {} col: {}",
                step, MAX_WINDOW_SAMPLES, row, col
            )));
        }
    }
    Ok(())
}

fn validate_window(above: f32, below: f32) -> VdsResult<()> {
    let valid = |v: f32| (0.0..MAX_WINDOW_EXTENT).contains(&v);
    if !valid(above) || !valid(below) {
        return Err(VdsError::invalid(format!(
            "Above and below must be in the range [0, {}), got above: {}, below: {}",
            MAX_WINDOW_EXTENT, above, below
        )));
    }
    Ok(())
}

fn validate_stepsize(stepsize: f32) -> VdsResult<()> {
    if !(stepsize >= 0.0 && stepsize.is_finite()) {
        return Err(VdsError::invalid(format!(
            "Stepsize must be zero or positive, got {}",
            stepsize
        )));
    }
    Ok(())
}

/// Decode one little-endian `f32` map
pub fn decode_map(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// A validated request, resolved into engine terms
#[derive(Debug, Clone)]
pub enum AttributeJob {
    Along {
        surface: RegularSurface,
        above: f32,
        below: f32,
        stepsize: f32,
        attributes: Vec<AttributeKind>,
        interpolation: Interpolation,
    },
    Between {
        primary: RegularSurface,
        secondary: RegularSurface,
        stepsize: f32,
        attributes: Vec<AttributeKind>,
        interpolation: Interpolation,
    },
}

impl AttributeJob {
    /// (rows, columns) of every output map
    pub fn shape(&self) -> [usize; 2] {
        let grid = match self {
            Self::Along { surface, .. } => surface,
            Self::Between { primary, .. } => primary,
        };
        [grid.nrows(), grid.ncols()]
    }

    pub fn execute(
        &self,
        engine: &AttributeEngine,
        source: &dyn DataSource,
    ) -> VdsResult<Vec<Vec<u8>>> {
        match self {
            Self::Along {
                surface,
                above,
                below,
                stepsize,
                attributes,
                interpolation,
            } => engine.along_surface(
                source,
                surface,
                *above,
                *below,
                *stepsize,
                attributes,
                *interpolation,
            ),
            Self::Between {
                primary,
                secondary,
                stepsize,
                attributes,
                interpolation,
            } => engine.between_surfaces(
                source,
                primary,
                secondary,
                *stepsize,
                attributes,
                *interpolation,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Plane;
    use crate::volume::{Axis, CellWindow, InMemoryVolume, VolumeMetadata};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    const FILL: f32 = -999.25;

    fn unit_plane() -> Plane {
        Plane::new(0.0, 0.0, 1.0, 1.0, 0.0).unwrap()
    }

    fn metadata() -> VolumeMetadata {
        VolumeMetadata {
            iline: Axis::new(1.0, 1.0, 2),
            xline: Axis::new(10.0, 1.0, 2),
            sample: Axis::new(0.0, 4.0, 10),
            plane: unit_plane(),
        }
    }

    /// Voxel value 100 * il + 10 * xl + s
    fn volume() -> InMemoryVolume {
        InMemoryVolume::from_fn(metadata(), |il, xl, s| (100 * il + 10 * xl + s) as f32).unwrap()
    }

    fn engine(workers: usize, chunk_size: usize) -> AttributeEngine {
        AttributeEngine::new(Capacity {
            max_workers: workers,
            chunk_size,
            chunks_per_worker: 4,
        })
        .unwrap()
    }

    fn surface(rows: &[Vec<f32>]) -> RegularSurface {
        RegularSurface::new(rows, unit_plane(), FILL).unwrap()
    }

    #[test]
    fn known_minimum_per_cell() {
        let reference = surface(&[vec![16.0, 16.0], vec![16.0, 16.0]]);
        let maps = engine(2, 0)
            .along_surface(
                &volume(),
                &reference,
                4.0,
                4.0,
                4.0,
                &[AttributeKind::Min],
                Interpolation::Nearest,
            )
            .unwrap();

        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].len(), 4 * 4);
        assert_eq!(decode_map(&maps[0]), vec![3.0, 13.0, 103.0, 113.0]);
    }

    #[test]
    fn output_order_follows_attribute_order() {
        let reference = surface(&[vec![16.0, 16.0]]);
        let maps = engine(2, 0)
            .along_surface(
                &volume(),
                &reference,
                4.0,
                4.0,
                4.0,
                &[AttributeKind::Max, AttributeKind::Min, AttributeKind::Max],
                Interpolation::Nearest,
            )
            .unwrap();

        assert_eq!(decode_map(&maps[0]), vec![5.0, 15.0]);
        assert_eq!(decode_map(&maps[1]), vec![3.0, 13.0]);
        assert_eq!(maps[2], maps[0]);
    }

    #[test]
    fn chunking_does_not_change_results() {
        let metadata = VolumeMetadata {
            iline: Axis::new(1.0, 1.0, 7),
            xline: Axis::new(1.0, 1.0, 5),
            sample: Axis::new(0.0, 4.0, 20),
            plane: unit_plane(),
        };
        let volume = InMemoryVolume::from_fn(metadata, |il, xl, s| {
            ((il * 31 + xl * 17 + s * 7) % 23) as f32 - 11.0
        })
        .unwrap();
        let rows: Vec<Vec<f32>> = (0..7)
            .map(|r| (0..5).map(|c| 30.0 + (r + c) as f32 * 1.5).collect())
            .collect();
        let reference = surface(&rows);
        let attributes = AttributeKind::ALL;

        let run = |engine: AttributeEngine| {
            engine
                .along_surface(
                    &volume,
                    &reference,
                    10.0,
                    6.0,
                    1.0,
                    &attributes,
                    Interpolation::Linear,
                )
                .unwrap()
        };

        let single = run(engine(4, reference.size()));
        let split = run(engine(4, 1));
        let uneven = run(engine(3, 4));
        assert_eq!(single, split);
        assert_eq!(single, uneven);
    }

    #[test]
    fn fill_propagates_along_surface() {
        let reference = surface(&[vec![16.0, FILL], vec![FILL, 16.0]]);
        let maps = engine(2, 1)
            .along_surface(
                &volume(),
                &reference,
                4.0,
                4.0,
                0.0,
                &[AttributeKind::Mean, AttributeKind::SampleValue],
                Interpolation::Nearest,
            )
            .unwrap();

        for map in &maps {
            let values = decode_map(map);
            assert_eq!(values[1], FILL);
            assert_eq!(values[2], FILL);
            assert_ne!(values[0], FILL);
        }
    }

    #[test]
    fn fill_propagates_between_surfaces() {
        let primary = surface(&[vec![12.0, FILL], vec![12.0, 12.0]]);
        let secondary = surface(&[vec![20.0, 20.0], vec![FILL, 20.0]]);
        let maps = engine(2, 1)
            .between_surfaces(
                &volume(),
                &primary,
                &secondary,
                4.0,
                &[AttributeKind::Max],
                Interpolation::Nearest,
            )
            .unwrap();

        let values = decode_map(&maps[0]);
        assert_eq!(values, vec![5.0, FILL, FILL, 115.0]);
    }

    #[test]
    fn between_surfaces_orders_by_depth() {
        let shallow = surface(&[vec![12.0, 12.0]]);
        let deep = surface(&[vec![20.0, 20.0]]);
        let e = engine(2, 0);
        let attrs = [AttributeKind::Min, AttributeKind::Max];

        let down = e
            .between_surfaces(&volume(), &shallow, &deep, 4.0, &attrs, Interpolation::Nearest)
            .unwrap();
        let up = e
            .between_surfaces(&volume(), &deep, &shallow, 4.0, &attrs, Interpolation::Nearest)
            .unwrap();

        assert_eq!(decode_map(&down[0]), vec![3.0, 13.0]);
        assert_eq!(decode_map(&down[1]), vec![5.0, 15.0]);
        assert_eq!(up, down);
    }

    #[test]
    fn intersecting_surfaces_are_rejected() {
        let primary = surface(&[vec![12.0, 20.0]]);
        let secondary = surface(&[vec![20.0, 12.0]]);
        let err = engine(2, 0)
            .between_surfaces(
                &volume(),
                &primary,
                &secondary,
                4.0,
                &[AttributeKind::Min],
                Interpolation::Nearest,
            )
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("intersect"));
    }

    #[test]
    fn window_margin_is_enforced() {
        let e = engine(2, 0);
        let run = |depth: f32, above: f32, below: f32| {
            e.along_surface(
                &volume(),
                &surface(&vec![vec![depth; 2]; 2]),
                above,
                below,
                4.0,
                &[AttributeKind::Min],
                Interpolation::Nearest,
            )
        };

        assert!(run(12.0, 4.0, 0.0).is_ok());
        assert!(run(24.0, 0.0, 4.0).is_ok());
        assert!(run(8.0, 4.0, 0.0).unwrap_err().is_invalid_argument());
        assert!(run(28.0, 0.0, 4.0).unwrap_err().is_invalid_argument());
    }

    /// Data source that records chunk calls and fails chosen chunks
    struct ScriptedSource {
        metadata: VolumeMetadata,
        calls: AtomicUsize,
        failing: Vec<usize>,
        panicking: Option<usize>,
        completed: Mutex<Vec<usize>>,
    }

    impl ScriptedSource {
        fn new(failing: Vec<usize>) -> Self {
            Self {
                metadata: metadata(),
                calls: AtomicUsize::new(0),
                failing,
                panicking: None,
                completed: Mutex::new(Vec::new()),
            }
        }
    }

    impl DataSource for ScriptedSource {
        fn metadata(&self) -> &VolumeMetadata {
            &self.metadata
        }

        fn build_subvolume(
            &self,
            reference: &RegularSurface,
            top: &RegularSurface,
            bottom: &RegularSurface,
        ) -> VdsResult<SubVolume> {
            let cell = CellWindow::locate(
                &self.metadata.sample,
                reference.value(0),
                top.value(0),
                bottom.value(0),
                (0.0, 0.0),
                (0, 0),
            )?;
            Ok(SubVolume::new(vec![Some(cell); reference.size()], FILL))
        }

        fn compute_attribute_chunk(
            &self,
            _subvolume: &SubVolume,
            _interpolation: Interpolation,
            _attributes: &[AttributeKind],
            _stepsize: f32,
            cells: Range<usize>,
            out: &mut [&mut [f32]],
        ) -> VdsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cells.start == 0 {
                // Let later chunks finish first
                thread::sleep(Duration::from_millis(50));
            }
            if self.panicking == Some(cells.start) {
                panic!("corrupt trace");
            }
            self.completed.lock().unwrap().push(cells.start);
            if self.failing.contains(&cells.start) {
                return Err(VdsError::internal(format!("chunk {} failed", cells.start)));
            }
            for map in out.iter_mut() {
                map.fill(1.0);
            }
            Ok(())
        }
    }

    fn run_scripted(source: &ScriptedSource, cells: usize) -> VdsResult<Vec<Vec<u8>>> {
        let reference = surface(&[vec![16.0; cells]]);
        engine(4, 1).along_surface(
            source,
            &reference,
            0.0,
            0.0,
            4.0,
            &[AttributeKind::Min],
            Interpolation::Nearest,
        )
    }

    #[test]
    fn first_error_in_dispatch_order_wins() {
        let source = ScriptedSource::new(vec![0, 5]);
        let err = run_scripted(&source, 8).unwrap_err();
        assert_eq!(err.to_string(), "Internal error: chunk 0 failed");
    }

    #[test]
    fn all_chunks_run_before_failure_is_reported() {
        let source = ScriptedSource::new(vec![2]);
        assert!(run_scripted(&source, 8).is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 8);
        assert_eq!(source.completed.lock().unwrap().len(), 8);
    }

    #[test]
    fn worker_panic_becomes_internal_error() {
        let mut source = ScriptedSource::new(vec![]);
        source.panicking = Some(3);
        let err = run_scripted(&source, 6).unwrap_err();
        assert!(matches!(err, VdsError::Internal(_)));
        assert!(err.to_string().contains("corrupt trace"));
    }

    #[test]
    fn invalid_input_dispatches_nothing() {
        let source = ScriptedSource::new(vec![]);
        let e = engine(2, 1);
        let reference = surface(&[vec![16.0, 16.0]]);
        let attrs = [AttributeKind::Min];

        let bad_window = e.along_surface(&source, &reference, 250.0, 0.0, 4.0, &attrs, Interpolation::Nearest);
        let negative = e.along_surface(&source, &reference, -1.0, 0.0, 4.0, &attrs, Interpolation::Nearest);
        let bad_step = e.along_surface(&source, &reference, 4.0, 4.0, -1.0, &attrs, Interpolation::Nearest);
        let nan_step = e.along_surface(&source, &reference, 4.0, 4.0, f32::NAN, &attrs, Interpolation::Nearest);
        let no_attrs = e.along_surface(&source, &reference, 4.0, 4.0, 4.0, &[], Interpolation::Nearest);

        for result in [bad_window, negative, bad_step, nan_step, no_attrs] {
            assert!(result.unwrap_err().is_invalid_argument());
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tiny_stepsize_is_rejected_before_dispatch() {
        let source = ScriptedSource::new(vec![]);
        let reference = surface(&[vec![16.0, 16.0]]);
        let attrs = [AttributeKind::Min];

        for stepsize in [1e-30, 1e-8] {
            let err = engine(2, 1)
                .along_surface(&source, &reference, 4.0, 4.0, stepsize, &attrs, Interpolation::Nearest)
                .unwrap_err();
            assert!(err.is_invalid_argument(), "{}", err);
            assert!(err.to_string().contains("row: 0 col: 0"));
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        let err = engine(2, 0)
            .along_surface(&volume(), &reference, 4.0, 4.0, 1e-30, &attrs, Interpolation::Nearest)
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn small_stepsize_within_cap_resamples() {
        let reference = surface(&[vec![16.0, 16.0]]);
        let maps = engine(2, 0)
            .along_surface(
                &volume(),
                &reference,
                4.0,
                4.0,
                0.5,
                &[AttributeKind::Min, AttributeKind::Max],
                Interpolation::Linear,
            )
            .unwrap();
        assert_eq!(decode_map(&maps[0]), vec![3.0, 13.0]);
        assert_eq!(decode_map(&maps[1]), vec![5.0, 15.0]);
    }

    #[test]
    fn unsupported_interpolation_is_rejected_up_front() {
        let reference = surface(&[vec![16.0, 16.0]]);
        let err = engine(2, 0)
            .along_surface(
                &volume(),
                &reference,
                4.0,
                4.0,
                4.0,
                &[AttributeKind::Min],
                Interpolation::Cubic,
            )
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("cubic"));
    }

    #[test]
    fn job_shape_and_execution() {
        let job = AttributeJob::Along {
            surface: surface(&[vec![16.0, 16.0, 16.0]]),
            above: 4.0,
            below: 4.0,
            stepsize: 4.0,
            attributes: vec![AttributeKind::Min],
            interpolation: Interpolation::Nearest,
        };
        assert_eq!(job.shape(), [1, 3]);

        let maps = job.execute(&engine(2, 0), &volume()).unwrap();
        // Third cell is outside the volume's two xlines
        assert_eq!(decode_map(&maps[0]), vec![3.0, 13.0, FILL]);
    }
}
