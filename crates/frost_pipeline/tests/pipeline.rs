//! Pipeline behaviour against the software backend

use std::sync::{Arc, Mutex};

use frost_core::{Color, IntOffset, IntSize, MaskBrush, Rect, RenderObjectId, Size, Style};
use frost_gpu::{SoftwareBackend, TextureOrigin};
use frost_pipeline::{
    CapturedFrame, Completion, ContentCanvas, FrameCapture, Pipeline, PipelineConfig,
    RegionUpdate, RenderState, UiContent,
};

const BLOCK: u32 = 16;

/// 16px blocks, each a different opaque color
struct Blocks(IntSize);

fn block_color(bx: u32, by: u32) -> Color {
    let r = ((bx * 67 + by * 13) % 255) as f32 / 255.0;
    let g = ((bx * 29 + by * 101) % 255) as f32 / 255.0;
    let b = ((bx * 151 + by * 43) % 255) as f32 / 255.0;
    Color::rgb(r, g, b)
}

impl UiContent for Blocks {
    fn size(&self) -> IntSize {
        self.0
    }

    fn draw(&self, canvas: &mut ContentCanvas) {
        for by in 0..self.0.height.div_ceil(BLOCK) {
            for bx in 0..self.0.width.div_ceil(BLOCK) {
                canvas.fill_rect(
                    Rect::new(
                        (bx * BLOCK) as f32,
                        (by * BLOCK) as f32,
                        BLOCK as f32,
                        BLOCK as f32,
                    ),
                    block_color(bx, by),
                );
            }
        }
    }
}

struct Solid(IntSize, Color);

impl UiContent for Solid {
    fn size(&self) -> IntSize {
        self.0
    }

    fn draw(&self, canvas: &mut ContentCanvas) {
        canvas.clear(self.1);
    }
}

fn pipeline_with(backend: SoftwareBackend, content: impl UiContent + 'static) -> Pipeline {
    Pipeline::new(PipelineConfig::default(), Box::new(backend), Arc::new(content)).unwrap()
}

fn blocks_pipeline(origin: TextureOrigin) -> Pipeline {
    pipeline_with(
        SoftwareBackend::new().with_origin(origin),
        Blocks(IntSize::new(200, 200)),
    )
}

fn attach(pipeline: &mut Pipeline, id: &str, size: Size) -> (RenderObjectId, FrameCapture) {
    let capture = FrameCapture::new();
    let id = RenderObjectId::from(id);
    pipeline.attach(id.clone(), size, Box::new(capture.clone()));
    (id, capture)
}

fn update(pipeline: &mut Pipeline, id: &RenderObjectId, update: RegionUpdate) -> Completion {
    let (done, completion) = Completion::channel();
    pipeline.update_region(id, update, done);
    completion
}

fn max_channel_diff(a: &CapturedFrame, b: &CapturedFrame) -> u8 {
    a.pixels
        .iter()
        .zip(&b.pixels)
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}

fn assert_close(actual: [u8; 4], expected: [u8; 4], tolerance: u8) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            a.abs_diff(e) <= tolerance,
            "pixel {:?} differs from {:?}",
            actual,
            expected
        );
    }
}

#[test]
fn test_low_res_rect_tracks_origin() {
    for (origin, expected_y) in [(TextureOrigin::TopLeft, 20.0), (TextureOrigin::BottomLeft, 65.0)] {
        let mut pipeline = blocks_pipeline(origin);
        let (id, _) = attach(&mut pipeline, "a", Size::new(60.0, 30.0));
        let done = update(&mut pipeline, &id, RegionUpdate::new().offset(IntOffset::new(20, 40)));
        pipeline.flush();
        assert_eq!(done.wait(), Ok(()));

        let object = pipeline.object(&id).unwrap();
        assert_eq!(object.high_res_rect(), Rect::new(20.0, 40.0, 60.0, 30.0));
        assert_eq!(object.low_res_rect(), Rect::new(10.0, expected_y, 30.0, 15.0));
    }
}

#[test]
fn test_low_res_rect_follows_every_offset() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, _) = attach(&mut pipeline, "a", Size::new(37.0, 23.0));
    for (x, y) in [(0, 0), (7, 13), (150, 3), (-10, 190), (199, 199)] {
        let _ = update(&mut pipeline, &id, RegionUpdate::new().offset(IntOffset::new(x, y)));
        let object = pipeline.object(&id).unwrap();
        let expected = object.high_res_rect().scale(0.5);
        assert!(object.low_res_rect().approx_eq(&expected, 1e-4));
        assert_eq!(object.low_res_rect().size, Size::new(18.5, 11.5));
    }
    pipeline.flush();
}

#[test]
fn test_output_is_identical_across_origins() {
    let render = |origin, offset| {
        let mut pipeline = blocks_pipeline(origin);
        let (id, capture) = attach(&mut pipeline, "a", Size::new(64.0, 48.0));
        let style = Style::new(6.0)
            .tint(Color::WHITE.with_alpha(0.4))
            .noise(0.2);
        let _ = update(
            &mut pipeline,
            &id,
            RegionUpdate::new()
                .offset(offset)
                .style(style)
                .mask(Some(MaskBrush::vertical_fade(1.0, 0.25))),
        );
        pipeline.flush();
        capture.latest().unwrap()
    };

    for offset in [IntOffset::new(32, 64), IntOffset::new(10, 22), IntOffset::new(100, 6)] {
        let top_left = render(TextureOrigin::TopLeft, offset);
        let bottom_left = render(TextureOrigin::BottomLeft, offset);
        assert_eq!(top_left.size, bottom_left.size);
        assert!(
            max_channel_diff(&top_left, &bottom_left) <= 2,
            "origins disagree at {:?}",
            offset
        );
    }
}

#[test]
fn test_zero_blur_reproduces_backdrop() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(64.0, 64.0));
    let _ = update(&mut pipeline, &id, RegionUpdate::new().offset(IntOffset::new(32, 32)));
    pipeline.flush();

    let frame = capture.latest().unwrap();
    assert_eq!(frame.size, IntSize::new(64, 64));
    for y in 0..64 {
        for x in 0..64 {
            let (cx, cy) = (x + 32, y + 32);
            let inside = |c: u32| (3..13).contains(&(c % BLOCK));
            if !(inside(cx) && inside(cy)) {
                continue;
            }
            let expected = block_color(cx / BLOCK, cy / BLOCK).to_rgba8();
            assert_close(frame.pixel(x, y), expected, 2);
        }
    }
}

#[test]
fn test_unchanged_style_skips_drawing() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    let style = Style::new(4.0).tint(Color::BLACK.with_alpha(0.5));
    let _ = update(&mut pipeline, &id, RegionUpdate::new().style(style));
    pipeline.flush();
    let draws = pipeline.stats().gpu.draw_calls;
    let presented = capture.presented();

    let mut done = update(&mut pipeline, &id, RegionUpdate::new().style(style));
    assert_eq!(done.try_wait(), Some(Ok(())));
    assert_eq!(pipeline.object(&id).unwrap().render_state(), RenderState::Clean);
    pipeline.flush();

    assert_eq!(pipeline.stats().gpu.draw_calls, draws);
    assert_eq!(capture.presented(), presented);
}

#[test]
fn test_zero_noise_runs_no_pass() {
    let draws_per_render = |noise: f32| {
        let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
        let (id, _) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
        pipeline.flush();
        let before = pipeline.stats().gpu.draw_calls;
        let _ = update(&mut pipeline, &id, RegionUpdate::new().style(Style::new(2.0).noise(noise)));
        pipeline.flush();
        pipeline.stats().gpu.draw_calls - before
    };

    assert_eq!(draws_per_render(0.0), 3);
    assert_eq!(draws_per_render(0.3), 4);
}

#[test]
fn test_request_render_waits_for_every_object() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (_, first) = attach(&mut pipeline, "a", Size::new(20.0, 20.0));
    let (_, second) = attach(&mut pipeline, "b", Size::new(30.0, 10.0));

    let (done, mut completion) = Completion::channel();
    pipeline.request_render(done);
    assert!(completion.try_wait().is_none());

    pipeline.flush();
    assert_eq!(completion.try_wait(), Some(Ok(())));
    assert_eq!(first.presented(), 1);
    assert_eq!(second.presented(), 1);
}

#[test]
fn test_request_render_with_no_objects_resolves_immediately() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (done, mut completion) = Completion::channel();
    pipeline.request_render(done);
    assert_eq!(completion.try_wait(), Some(Ok(())));
}

#[test]
fn test_request_render_counts_down_removed_objects() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (_, _first) = attach(&mut pipeline, "a", Size::new(20.0, 20.0));
    let (second_id, _second) = attach(&mut pipeline, "b", Size::new(20.0, 20.0));

    let (done, completion) = Completion::channel();
    pipeline.request_render(done);
    pipeline.remove_render_object(&second_id);
    pipeline.flush();
    assert_eq!(completion.wait(), Ok(()));
}

#[test]
fn test_detach_cancels_and_readd_starts_clean() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let shared_textures = pipeline.stats().gpu.live_textures;
    let (id, capture) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    let _ = update(
        &mut pipeline,
        &id,
        RegionUpdate::new()
            .style(Style::new(8.0))
            .mask(Some(MaskBrush::vertical_fade(1.0, 0.0))),
    );
    pipeline.flush();

    let pending = update(&mut pipeline, &id, RegionUpdate::new().offset(IntOffset::new(8, 8)));
    pipeline.detach(&id);
    pipeline.detach(&id);

    assert_eq!(pending.wait(), Err(frost_pipeline::RenderCanceled));
    assert!(capture.is_detached());
    assert_eq!(pipeline.stats().gpu.live_textures, shared_textures);

    let (id, capture) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    let object = pipeline.object(&id).unwrap();
    assert_eq!(*object.style(), Style::default());
    assert!(object.mask().is_none());
    assert_eq!(object.high_res_rect(), Rect::new(0.0, 0.0, 40.0, 40.0));
    pipeline.flush();
    assert_eq!(capture.presented(), 1);
}

#[test]
fn test_replacing_an_id_releases_previous_object() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (_, first) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    pipeline.flush();
    let live = pipeline.stats().gpu.live_textures;

    let (_, second) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    assert!(first.is_detached());
    assert_eq!(pipeline.object_count(), 1);
    pipeline.flush();
    assert_eq!(second.presented(), 1);
    assert_eq!(pipeline.stats().gpu.live_textures, live);
}

#[test]
fn test_blurring_a_solid_backdrop_keeps_its_color() {
    let color = Color::rgb(0.2, 0.6, 0.4);
    let mut pipeline = pipeline_with(SoftwareBackend::new(), Solid(IntSize::new(200, 200), color));
    let (id, capture) = attach(&mut pipeline, "a", Size::new(100.0, 100.0));
    let _ = update(
        &mut pipeline,
        &id,
        RegionUpdate::new()
            .offset(IntOffset::new(50, 50))
            .style(Style::new(8.0)),
    );
    pipeline.flush();

    let frame = capture.latest().unwrap();
    let expected = color.to_rgba8();
    for px in frame.pixels.chunks_exact(4) {
        assert_close([px[0], px[1], px[2], px[3]], expected, 2);
    }
}

#[test]
fn test_transparent_mask_hides_region_even_with_noise() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(48.0, 48.0));
    let done = update(
        &mut pipeline,
        &id,
        RegionUpdate::new()
            .style(Style::new(4.0).tint(Color::RED.with_alpha(0.8)).noise(0.5))
            .mask(Some(MaskBrush::clear())),
    );
    pipeline.flush();
    assert_eq!(done.wait(), Ok(()));

    let frame = capture.latest().unwrap();
    assert!(frame.pixels.chunks_exact(4).all(|px| px[3] == 0));
}

#[test]
fn test_mask_fades_alpha_top_to_bottom() {
    let mut pipeline = blocks_pipeline(TextureOrigin::BottomLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(40.0, 100.0));
    let _ = update(
        &mut pipeline,
        &id,
        RegionUpdate::new().mask(Some(MaskBrush::vertical_fade(1.0, 0.0))),
    );
    pipeline.flush();

    let frame = capture.latest().unwrap();
    assert!(frame.pixel(20, 0)[3] > 245);
    assert!(frame.pixel(20, 99)[3] < 10);
    assert!(frame.pixel(20, 25)[3] > frame.pixel(20, 75)[3]);
}

#[test]
fn test_objects_do_not_affect_each_other() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (a, capture_a) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    let _ = update(
        &mut pipeline,
        &a,
        RegionUpdate::new()
            .offset(IntOffset::new(16, 16))
            .style(Style::new(4.0)),
    );
    pipeline.flush();
    let alone = capture_a.latest().unwrap();

    let (b, capture_b) = attach(&mut pipeline, "b", Size::new(80.0, 80.0));
    let _ = update(
        &mut pipeline,
        &b,
        RegionUpdate::new()
            .offset(IntOffset::new(30, 30))
            .style(Style::new(20.0).tint(Color::BLACK.with_alpha(0.9)).noise(0.4)),
    );
    let (done, _) = Completion::channel();
    pipeline.request_render(done);
    pipeline.flush();

    let together = capture_a.latest().unwrap();
    assert_eq!(together.sequence, 2);
    assert_eq!(alone.pixels, together.pixels);
    assert!(capture_b.presented() >= 1);
}

#[test]
fn test_moving_one_object_leaves_the_other_untouched() {
    let mut pipeline = blocks_pipeline(TextureOrigin::BottomLeft);
    let (a, capture_a) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    let (b, capture_b) = attach(&mut pipeline, "b", Size::new(60.0, 30.0));
    let _ = update(
        &mut pipeline,
        &a,
        RegionUpdate::new()
            .offset(IntOffset::new(16, 16))
            .style(Style::new(4.0)),
    );
    let _ = update(&mut pipeline, &b, RegionUpdate::new().offset(IntOffset::new(80, 40)));
    pipeline.flush();

    let rect_before = pipeline.object(&a).unwrap().low_res_rect();
    let frame_before = capture_a.latest().unwrap();
    let presented_b = capture_b.presented();

    let moved = update(&mut pipeline, &b, RegionUpdate::new().offset(IntOffset::new(120, 100)));
    pipeline.flush();
    assert_eq!(moved.wait(), Ok(()));

    assert_eq!(pipeline.object(&a).unwrap().low_res_rect(), rect_before);
    assert_eq!(capture_a.latest().unwrap(), frame_before);
    assert_eq!(capture_a.presented(), frame_before.sequence);
    assert_eq!(capture_b.presented(), presented_b + 1);
}

#[test]
fn test_failed_mask_is_retried_on_next_render() {
    // Shared capture is 360_000 bytes and each 40x40 object 9_600 more; the
    // 6_400 byte mask only fits once "b" is gone.
    let backend = SoftwareBackend::new().with_memory_budget(380_000);
    let mut pipeline = pipeline_with(backend, Blocks(IntSize::new(200, 200)));
    let (a, capture) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    let (b, _) = attach(&mut pipeline, "b", Size::new(40.0, 40.0));
    pipeline.flush();
    assert_eq!(capture.presented(), 1);

    let masked = update(&mut pipeline, &a, RegionUpdate::new().mask(Some(MaskBrush::clear())));
    pipeline.flush();
    assert_eq!(masked.wait(), Ok(()));
    assert_eq!(capture.presented(), 1);
    assert_eq!(pipeline.stats().skipped, 1);
    assert!(pipeline.object(&a).unwrap().mask().is_some());

    pipeline.detach(&b);
    let (done, completion) = Completion::channel();
    pipeline.request_render(done);
    pipeline.flush();
    assert_eq!(completion.wait(), Ok(()));

    assert_eq!(capture.presented(), 2);
    assert_eq!(capture.latest().unwrap().pixel(8, 8)[3], 0);
}

#[test]
fn test_clearing_absent_mask_skips_drawing() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    pipeline.flush();
    let renders = pipeline.stats().renders;

    let cleared = update(&mut pipeline, &id, RegionUpdate::new().mask(None));
    assert_eq!(pipeline.object(&id).unwrap().render_state(), RenderState::Clean);
    pipeline.flush();

    assert_eq!(cleared.wait(), Ok(()));
    assert_eq!(pipeline.stats().renders, renders);
    assert_eq!(capture.presented(), 1);
}

#[test]
fn test_intermediates_are_reused_across_frames() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(50.0, 30.0));
    let _ = update(&mut pipeline, &id, RegionUpdate::new().style(Style::new(6.0)));
    pipeline.flush();
    let created = pipeline.stats().gpu.textures_created;

    for step in 1..=5 {
        let _ = update(
            &mut pipeline,
            &id,
            RegionUpdate::new().offset(IntOffset::new(step * 10, step * 6)),
        );
        pipeline.flush();
    }

    assert_eq!(capture.presented(), 6);
    assert_eq!(pipeline.stats().gpu.textures_created, created);
}

#[test]
fn test_allocation_failure_skips_only_that_object() {
    // Shared capture of 200x200 at half resolution is 360_000 bytes; the small
    // object needs 9_600 more, the large one does not fit.
    let backend = SoftwareBackend::new().with_memory_budget(380_000);
    let mut pipeline = pipeline_with(backend, Blocks(IntSize::new(200, 200)));
    let (_, small) = attach(&mut pipeline, "small", Size::new(40.0, 40.0));
    let (_, large) = attach(&mut pipeline, "large", Size::new(120.0, 120.0));

    let (done, completion) = Completion::channel();
    pipeline.request_render(done);
    pipeline.flush();

    assert_eq!(completion.wait(), Ok(()));
    assert_eq!(small.presented(), 1);
    assert_eq!(large.presented(), 0);
    let stats = pipeline.stats();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.gpu.live_bytes, 369_600);
}

#[test]
fn test_updates_before_render_coalesce() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(40.0, 40.0));
    pipeline.flush();
    let renders = pipeline.stats().renders;

    let offset = {
        let (done, completion) = Completion::channel();
        pipeline.update_offset(&id, IntOffset::new(10, 10), done);
        completion
    };
    let style = {
        let (done, completion) = Completion::channel();
        pipeline.update_style(&id, Style::new(5.0), done);
        completion
    };
    let mask = {
        let (done, completion) = Completion::channel();
        pipeline.update_mask(&id, Some(MaskBrush::vertical_fade(1.0, 0.5)), done);
        completion
    };
    pipeline.flush();

    assert_eq!(offset.wait(), Ok(()));
    assert_eq!(style.wait(), Ok(()));
    assert_eq!(mask.wait(), Ok(()));
    assert_eq!(pipeline.stats().renders, renders + 1);
    assert_eq!(capture.presented(), 2);
}

/// Content whose size the test can change between frames
struct Resizable(Mutex<IntSize>);

impl UiContent for Resizable {
    fn size(&self) -> IntSize {
        *self.0.lock().unwrap()
    }

    fn draw(&self, canvas: &mut ContentCanvas) {
        canvas.clear(Color::GRAY);
    }
}

#[test]
fn test_content_changed_redraws_objects() {
    let mut pipeline = pipeline_with(
        SoftwareBackend::new(),
        Solid(IntSize::new(100, 100), Color::GRAY),
    );
    let mut frames = pipeline.frames();
    let (id, capture) = attach(&mut pipeline, "a", Size::new(20.0, 20.0));
    pipeline.flush();

    pipeline.content_changed();
    assert!(frames.has_changed().unwrap());
    assert_eq!(frames.borrow_and_update().frame, 2);
    assert_eq!(
        pipeline.object(&id).unwrap().render_state(),
        RenderState::Dirty
    );
    pipeline.flush();
    assert_eq!(capture.presented(), 2);
}

#[test]
fn test_content_resize_rebinds_objects() {
    let content = Arc::new(Resizable(Mutex::new(IntSize::new(100, 100))));
    let mut pipeline = Pipeline::new(
        PipelineConfig::default(),
        Box::new(SoftwareBackend::new()),
        content.clone(),
    )
    .unwrap();
    let (id, capture) = attach(&mut pipeline, "a", Size::new(20.0, 20.0));
    let _ = update(&mut pipeline, &id, RegionUpdate::new().offset(IntOffset::new(40, 40)));
    pipeline.flush();

    *content.0.lock().unwrap() = IntSize::new(300, 200);
    pipeline.content_changed();

    assert_eq!(pipeline.frames().borrow().size, IntSize::new(300, 200));
    assert_eq!(pipeline.shared_layer().low_res_size(), IntSize::new(150, 100));
    let object = pipeline.object(&id).unwrap();
    assert_eq!(object.high_res_rect(), Rect::new(40.0, 40.0, 20.0, 20.0));
    assert_eq!(object.low_res_rect(), Rect::new(20.0, 20.0, 10.0, 10.0));

    pipeline.flush();
    let frame = capture.latest().unwrap();
    assert_eq!(frame.sequence, 2);
    assert_close(frame.pixel(10, 10), Color::GRAY.to_rgba8(), 2);
}

#[test]
fn test_zero_sized_region_is_inert() {
    let mut pipeline = blocks_pipeline(TextureOrigin::TopLeft);
    let (id, capture) = attach(&mut pipeline, "a", Size::new(0.0, 30.0));
    let done = update(&mut pipeline, &id, RegionUpdate::new().style(Style::new(3.0)));
    pipeline.flush();

    assert_eq!(done.wait(), Ok(()));
    assert_eq!(capture.presented(), 0);
    assert_eq!(pipeline.stats().renders, 0);
}
