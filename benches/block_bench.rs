use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array3;

use rsgis_blocks::affine::Affine;
use rsgis_blocks::blockiter::{BatchBlockIterator, BlockIterator, ImageBandInfo};
use rsgis_blocks::raster::Dataset;
use rsgis_blocks::resample::ResamplingMethod;
use rsgis_blocks::sampler::{extract_window, SampleWindow};
use rsgis_blocks::tiling::TileGrid;

fn make_raster(size: usize, bands: usize, x0: f64) -> Dataset {
    let data = Array3::from_shape_fn((bands, size, size), |(b, r, c)| (b * size * size + r * size + c) as f64);
    Dataset::mem(
        data,
        Affine::new(10.0, 0.0, x0, 0.0, -10.0, 6_600_000.0),
        Some(32633),
        None,
    )
}

fn bench_tile_layout(c: &mut Criterion) {
    for &(size, tile) in &[(10_000, 256), (40_000, 512)] {
        c.bench_function(&format!("tile_layout_{size}px_{tile}"), |b| {
            b.iter(|| {
                let grid = TileGrid::new(size, size, tile).unwrap();
                black_box(grid.tiles().map(|t| t.x_off + t.y_off).sum::<usize>())
            });
        });
    }
}

fn bench_block_iteration(c: &mut Criterion) {
    for &size in &[512, 2048] {
        c.bench_function(&format!("block_iter_2_inputs_{size}px_256"), |b| {
            b.iter(|| {
                let mut iter = BlockIterator::from_datasets(
                    vec![
                        (ImageBandInfo::new("a", "a", vec![1, 2, 3]), make_raster(size, 3, 500_000.0)),
                        (ImageBandInfo::new("b", "b", vec![1]), make_raster(size, 1, 500_100.0)),
                    ],
                    256,
                )
                .unwrap();
                let mut acc = 0.0;
                while let Some(block) = iter.next_block() {
                    acc += block.unwrap().images[0].data[(0, 0, 0)];
                }
                black_box(acc)
            });
        });
    }
}

fn bench_batch_iteration(c: &mut Criterion) {
    for &batch in &[1, 8, 32] {
        c.bench_function(&format!("batch_iter_1024px_128_batch{batch}"), |b| {
            b.iter(|| {
                let iter = BatchBlockIterator::from_datasets(
                    vec![(ImageBandInfo::new("a", "a", vec![1, 2]), make_raster(1024, 2, 500_000.0))],
                    128,
                    batch,
                )
                .unwrap();
                black_box(iter.map(|b| b.unwrap().data.len()).sum::<usize>())
            });
        });
    }
}

fn bench_window_extraction(c: &mut Criterion) {
    let mut ds = make_raster(1024, 4, 500_000.0);
    for method in [ResamplingMethod::Nearest, ResamplingMethod::Bilinear, ResamplingMethod::Cubic] {
        for &half in &[5, 25] {
            let window = SampleWindow::new(505_120.0, 6_594_880.0, half, half, 33.0).unwrap();
            c.bench_function(&format!("window_{method:?}_half{half}_rot33"), |b| {
                b.iter(|| black_box(extract_window(&mut ds, &window, method, None).unwrap()));
            });
        }
    }
}

criterion_group!(
    benches,
    bench_tile_layout,
    bench_block_iteration,
    bench_batch_iteration,
    bench_window_extraction
);
criterion_main!(benches);
