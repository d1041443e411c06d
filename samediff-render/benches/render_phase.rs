use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use samediff_core::Display;
use samediff_render::{ImageStore, SkiaRenderer};
use samediff_timing::HighPrecisionTimer;
use tiny_skia::{Color, Pixmap};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

struct Harness {
    renderer: SkiaRenderer,
    images: ImageStore,
    fb: Vec<u8>,
    timer: HighPrecisionTimer,
}

fn harness() -> Harness {
    let renderer = SkiaRenderer::new(WIDTH, HEIGHT, None).unwrap();
    let (side, _) = renderer.layout().slot_size();
    let mut images = ImageStore::new(".", renderer.layout().slot_size());
    for (name, color) in [("left.png", [200, 40, 40]), ("right.png", [40, 40, 200])] {
        let mut pm = Pixmap::new(side, side).unwrap();
        pm.fill(Color::from_rgba8(color[0], color[1], color[2], 255));
        images.insert(name, pm);
    }
    Harness {
        renderer,
        images,
        fb: vec![0u8; (WIDTH * HEIGHT * 4) as usize],
        timer: HighPrecisionTimer::new(),
    }
}

fn bench_display(c: &mut Criterion, name: &str, display: Display) {
    c.benchmark_group("render_phase")
        .sample_size(60)
        .bench_function(name, |b| {
            b.iter_batched(
                harness,
                |mut h| {
                    let stats = h.renderer.render_frame(
                        black_box(&display),
                        &h.images,
                        &mut h.fb,
                        &h.timer,
                    );
                    black_box(stats)
                },
                BatchSize::LargeInput,
            )
        });
}

pub fn bench_phases(c: &mut Criterion) {
    bench_display(c, "fixation", Display::Fixation);
    bench_display(c, "placeholder", Display::Placeholder);
    bench_display(
        c,
        "image_pair",
        Display::ImagePair {
            left: "left.png".into(),
            right: "right.png".into(),
        },
    );
}

criterion_group!(benches, bench_phases);
criterion_main!(benches);
