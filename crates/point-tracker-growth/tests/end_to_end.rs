use approx::assert_relative_eq;
use nalgebra::Point2;
use point_tracker_core::{
    CancelToken, CellId, Dataset, Frame, LifeSpan, NoProgress, PointId, ProgressEvent, ProgressSink,
    RunOutcome, Wall,
};
use point_tracker_growth::{
    compute_growth, CellSelection, GrowthMethod, GrowthParams, GrowthResult,
};

const SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];

/// One square cell scaled by `factor^k` at frame `k` (time `k` hours).
fn scaled_square(nb_frames: usize, factor: f64) -> (Dataset, CellId, Vec<PointId>) {
    let frames = (0..nb_frames)
        .map(|k| Frame::new(format!("t{k}"), k as f64))
        .collect();
    let mut data = Dataset::new(frames).expect("dataset");
    let ids: Vec<PointId> = SQUARE.iter().map(|_| data.new_point_id()).collect();
    for k in 0..nb_frames {
        let s = factor.powi(k as i32);
        for (&id, &(x, y)) in ids.iter().zip(&SQUARE) {
            data.set_position(k, id, Point2::new(s * x, s * y)).expect("pos");
        }
    }
    let cell = data
        .add_cell(ids.clone(), LifeSpan::starting_at(0))
        .expect("cell");
    (data, cell, ids)
}

fn run(data: &Dataset, frames: &[usize], params: &GrowthParams) -> GrowthResult {
    match compute_growth(data, frames, params, &CancelToken::new(), &mut NoProgress).expect("growth") {
        RunOutcome::Completed(r) => r,
        RunOutcome::Aborted(_) => panic!("unexpected abort"),
    }
}

fn all_cells(allow_daughters: bool) -> CellSelection {
    CellSelection::AllCells {
        allow_daughters,
        max_variation: None,
    }
}

#[test]
fn uniformly_scaled_square_forward() {
    let (data, cell, _) = scaled_square(2, 1.1);
    let result = run(
        &data,
        &[0, 1],
        &GrowthParams {
            method: GrowthMethod::Forward,
            selection: all_cells(false),
            exp_correction: true,
        },
    );

    let ln = 1.1f64.ln();
    assert_eq!(result.frames.len(), 1);
    let frame = &result.frames[0];
    assert_eq!(frame.image, "t0");
    assert_eq!(frame.cells.len(), 1);
    let g = frame.cells[&cell];
    assert_relative_eq!(g.kmaj, ln, epsilon = 1e-9);
    assert_relative_eq!(g.kmin, ln, epsilon = 1e-9);
    assert_relative_eq!(g.psi, 0.0, epsilon = 1e-9);
    assert_relative_eq!(frame.cell_area_rates[&cell], 2.0 * ln, epsilon = 1e-9);
    assert_eq!(frame.walls.len(), 4);
    for rate in frame.walls.values() {
        assert_relative_eq!(*rate, ln, epsilon = 1e-9);
    }
    assert_eq!(result.images_used, vec!["t0", "t1"]);
}

#[test]
fn backward_reports_under_second_frame() {
    let (data, cell, _) = scaled_square(3, 1.1);
    let result = run(
        &data,
        &[0, 1, 2],
        &GrowthParams {
            method: GrowthMethod::Backward,
            selection: all_cells(false),
            exp_correction: true,
        },
    );
    let names: Vec<&str> = result.frames.iter().map(|f| f.image.as_str()).collect();
    assert_eq!(names, vec!["t1", "t2"]);
    for frame in &result.frames {
        assert_relative_eq!(frame.cells[&cell].kmaj, 1.1f64.ln(), epsilon = 1e-9);
    }
}

#[test]
fn linear_rates_without_correction() {
    let (data, cell, _) = scaled_square(2, 1.1);
    let result = run(
        &data,
        &[0, 1],
        &GrowthParams {
            exp_correction: false,
            ..GrowthParams::default()
        },
    );
    let frame = &result.frames[0];
    assert_relative_eq!(frame.cells[&cell].kmaj, 0.1, epsilon = 1e-9);
    assert_relative_eq!(frame.cell_area_rates[&cell], 0.21, epsilon = 1e-9);
}

struct CancelOnFirstItem {
    token: CancelToken,
    events: Vec<ProgressEvent>,
}

impl ProgressSink for CancelOnFirstItem {
    fn emit(&mut self, event: ProgressEvent) {
        if matches!(event, ProgressEvent::NextItem { .. }) {
            self.token.cancel();
        }
        self.events.push(event);
    }
}

#[test]
fn cancellation_after_first_pair() {
    let (data, _, _) = scaled_square(6, 1.1);
    let token = CancelToken::new();
    let mut sink = CancelOnFirstItem {
        token: token.clone(),
        events: Vec::new(),
    };
    let outcome = compute_growth(
        &data,
        &[0, 1, 2, 3, 4, 5],
        &GrowthParams::default(),
        &token,
        &mut sink,
    )
    .expect("growth");

    assert!(outcome.is_aborted());
    assert!(outcome.into_inner().frames.len() <= 1);
    assert_eq!(
        sink.events,
        vec![ProgressEvent::NextItem { index: 0 }, ProgressEvent::Aborted]
    );
}

#[test]
fn dense_and_sparse_agree_with_inserted_wall_point() {
    // 1.25 keeps every length exact, so the sample count is predictable.
    let (mut data, cell, ids) = scaled_square(2, 1.25);
    let mid = data.new_point_id();
    data.set_position(1, mid, Point2::new(6.25, 0.0)).expect("mid");
    data.set_cell_ring(cell, vec![ids[0], mid, ids[1], ids[2], ids[3]])
        .expect("ring");

    let sparse = run(&data, &[0, 1], &GrowthParams::default());
    let dense = run(
        &data,
        &[0, 1],
        &GrowthParams {
            method: GrowthMethod::ForwardDense { nb_points: 80 },
            ..GrowthParams::default()
        },
    );

    let ln = 1.25f64.ln();
    let s = sparse.frames[0].cells[&cell];
    let d = dense.frames[0].cells[&cell];
    assert_relative_eq!(s.kmaj, ln, epsilon = 1e-9);
    assert_relative_eq!(d.kmaj, s.kmaj, epsilon = 1e-9);
    assert_relative_eq!(d.kmin, s.kmin, epsilon = 1e-9);
    let shapes = &dense.frames[0].shapes[&cell];
    assert_eq!(shapes.before.len(), 80);
    assert_eq!(shapes.after.len(), 80);
    assert_eq!(sparse.frames[0].shapes[&cell].before.len(), 4);
    // The bottom wall is measured along both halves at the second frame.
    assert_eq!(dense.frames[0].walls.len(), 4);
    for rate in dense.frames[0].walls.values() {
        assert_relative_eq!(*rate, ln, epsilon = 1e-9);
    }
}

/// `scaled_square` divided at frame 1 along its vertical middle line.
fn divided_square(nb_frames: usize, factor: f64) -> (Dataset, CellId, Vec<PointId>, [CellId; 2]) {
    let (mut data, cell, ids) = scaled_square(nb_frames, factor);
    let bottom = data.new_point_id();
    let top = data.new_point_id();
    for k in 1..nb_frames {
        let s = factor.powi(k as i32);
        data.set_position(k, bottom, Point2::new(5.0 * s, 0.0)).expect("bottom");
        data.set_position(k, top, Point2::new(5.0 * s, 10.0 * s)).expect("top");
    }
    data.set_cell_ring(cell, vec![ids[0], bottom, ids[1], ids[2], top, ids[3]])
        .expect("ring");
    let daughters = data
        .divide_cell(
            cell,
            1,
            [
                vec![ids[0], bottom, top, ids[3]],
                vec![bottom, ids[1], ids[2], top],
            ],
            [bottom, top],
        )
        .expect("divide");
    (data, cell, ids, daughters)
}

#[test]
fn divided_cell_followed_only_with_daughters() {
    let (data, cell, _, _) = divided_square(2, 1.1);

    let followed = run(
        &data,
        &[0, 1],
        &GrowthParams {
            selection: all_cells(true),
            ..GrowthParams::default()
        },
    );
    let frame = &followed.frames[0];
    assert_relative_eq!(frame.cell_area_rates[&cell], 2.0 * 1.1f64.ln(), epsilon = 1e-9);
    assert_relative_eq!(frame.cells[&cell].kmaj, 1.1f64.ln(), epsilon = 1e-9);

    let strict = run(&data, &[0, 1], &GrowthParams::default());
    assert!(strict.frames[0].cells.is_empty());
}

#[test]
fn every_policy_follows_daughters_when_allowed() {
    let (data, cell, _, _) = divided_square(2, 1.1);
    let ln = 1.1f64.ln();
    for selection in [
        CellSelection::FullCellsOnly {
            allow_daughters: true,
        },
        CellSelection::AddPoints {
            allow_daughters: true,
            max_variation: 0.5,
        },
    ] {
        let result = run(
            &data,
            &[0, 1],
            &GrowthParams {
                selection,
                ..GrowthParams::default()
            },
        );
        let frame = &result.frames[0];
        assert_relative_eq!(frame.cells[&cell].kmaj, ln, epsilon = 1e-9);
        assert_relative_eq!(frame.cell_area_rates[&cell], 2.0 * ln, epsilon = 1e-9);
    }

    // The merged outline grows by 21%, above this cap.
    let capped = run(
        &data,
        &[0, 1],
        &GrowthParams {
            selection: CellSelection::AddPoints {
                allow_daughters: true,
                max_variation: 0.1,
            },
            ..GrowthParams::default()
        },
    );
    assert!(capped.frames[0].cells.is_empty());
}

#[test]
fn surviving_daughter_carries_the_area() {
    let (mut data, cell, ids, [d1, d2]) = divided_square(3, 1.0);
    data.set_cell_end(d2, Some(2)).expect("end");
    let result = run(
        &data,
        &[0, 2],
        &GrowthParams {
            selection: all_cells(true),
            ..GrowthParams::default()
        },
    );
    let frame = &result.frames[0];
    assert_eq!(frame.cells.keys().copied().collect::<Vec<_>>(), vec![cell]);
    assert_relative_eq!(frame.cells[&cell].kmaj, 0.0, epsilon = 1e-9);
    // Only the left half is left: 100 -> 50 over two hours.
    assert_relative_eq!(frame.cell_area_rates[&cell], 0.5f64.ln() / 2.0, epsilon = 1e-9);
    // The left wall is the only one of the mother still on the outline.
    assert_eq!(frame.walls.len(), 1);
    assert_relative_eq!(frame.walls[&Wall::new(ids[3], ids[0])], 0.0, epsilon = 1e-12);
    assert_eq!(data.cell_outline(cell, 2, true), data.cell_ring_at(d1, 2));
}

#[test]
fn missing_division_point_keeps_full_cell() {
    let (mut data, cell, ids) = scaled_square(2, 1.25);
    let bottom = data.new_point_id();
    let top = data.new_point_id();
    let mid = data.new_point_id();
    data.set_position(0, bottom, Point2::new(5.0, 0.0)).expect("bottom");
    data.set_position(1, bottom, Point2::new(6.25, 0.0)).expect("bottom");
    // The division wall ends at `top`, which is lost at frame 1.
    data.set_position(0, top, Point2::new(5.0, 10.0)).expect("top");
    data.set_position(1, mid, Point2::new(6.25, 6.25)).expect("mid");
    data.set_cell_ring(cell, vec![ids[0], bottom, ids[1], ids[2], top, ids[3]])
        .expect("ring");
    data.divide_cell(
        cell,
        1,
        [
            vec![ids[0], bottom, mid, top, ids[3]],
            vec![bottom, ids[1], ids[2], top, mid],
        ],
        [bottom, top],
    )
    .expect("divide");

    let full = |allow_daughters| GrowthParams {
        selection: CellSelection::FullCellsOnly { allow_daughters },
        ..GrowthParams::default()
    };
    let followed = run(&data, &[0, 1], &full(true));
    let frame = &followed.frames[0];
    assert_relative_eq!(frame.cells[&cell].kmaj, 1.25f64.ln(), epsilon = 1e-9);
    assert_relative_eq!(frame.cells[&cell].kmin, 1.25f64.ln(), epsilon = 1e-9);
    assert_eq!(frame.shapes[&cell].before.len(), 5);

    let collapsed = run(&data, &[0, 1], &full(false));
    assert!(collapsed.frames[0].cells.is_empty());
}

#[test]
fn backward_dense_reports_under_second_frame() {
    let (data, cell, _) = scaled_square(3, 1.25);
    let result = run(
        &data,
        &[0, 1, 2],
        &GrowthParams {
            method: GrowthMethod::BackwardDense { nb_points: 40 },
            selection: all_cells(false),
            exp_correction: true,
        },
    );
    let names: Vec<&str> = result.frames.iter().map(|f| f.image.as_str()).collect();
    assert_eq!(names, vec!["t1", "t2"]);
    let ln = 1.25f64.ln();
    for frame in &result.frames {
        let g = frame.cells[&cell];
        assert_relative_eq!(g.kmaj, ln, epsilon = 1e-9);
        assert_relative_eq!(g.kmin, ln, epsilon = 1e-9);
        assert_relative_eq!(frame.cell_area_rates[&cell], 2.0 * ln, epsilon = 1e-9);
        assert_eq!(frame.shapes[&cell].after.len(), 40);
    }
}

#[test]
fn shared_wall_is_measured_once() {
    // 5 - 4 - 3
    // |   |   |
    // 0 - 1 - 2, stretched by 1.2 along x.
    let coords = [(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (20.0, 10.0), (10.0, 10.0), (0.0, 10.0)];
    let mut data = Dataset::new(vec![Frame::new("t0", 0.0), Frame::new("t1", 1.0)]).expect("dataset");
    let ids: Vec<PointId> = coords
        .iter()
        .map(|&(x, y)| {
            let id = data.add_point(0, Point2::new(x, y)).expect("point");
            data.set_position(1, id, Point2::new(1.2 * x, y)).expect("pos");
            id
        })
        .collect();
    let left = data
        .add_cell(vec![ids[0], ids[1], ids[4], ids[5]], LifeSpan::starting_at(0))
        .expect("left");
    let right = data
        .add_cell(vec![ids[1], ids[2], ids[3], ids[4]], LifeSpan::starting_at(0))
        .expect("right");

    let result = run(&data, &[0, 1], &GrowthParams::default());
    let frame = &result.frames[0];
    assert_eq!(frame.cells.keys().copied().collect::<Vec<_>>(), vec![left, right]);
    assert_eq!(frame.walls.len(), 7);
    assert_relative_eq!(frame.walls[&Wall::new(ids[4], ids[1])], 0.0, epsilon = 1e-12);
    let stretched = frame
        .walls
        .values()
        .filter(|&&r| (r - 1.2f64.ln()).abs() < 1e-9)
        .count();
    assert_eq!(stretched, 4);
}

#[test]
fn invalid_frame_lists_are_rejected() {
    let (data, _, _) = scaled_square(3, 1.1);
    let params = GrowthParams::default();
    let cancel = CancelToken::new();
    assert!(compute_growth(&data, &[0], &params, &cancel, &mut NoProgress).is_err());
    assert!(compute_growth(&data, &[2, 1], &params, &cancel, &mut NoProgress).is_err());
    assert!(compute_growth(&data, &[0, 7], &params, &cancel, &mut NoProgress).is_err());
}

#[test]
fn result_serialises_to_json() {
    let (data, _, _) = scaled_square(2, 1.1);
    let result = run(&data, &[0, 1], &GrowthParams::default());
    let json = serde_json::to_string(&result).expect("json");
    let back: GrowthResult = serde_json::from_str(&json).expect("back");
    assert_eq!(back.frames[0].walls.len(), 4);
    assert_eq!(back.method, GrowthMethod::Forward);
}
