use criterion::{criterion_group, criterion_main, Criterion};

use fans_core::convolution::DistributedFft;
use fans_core::green_operator::GreenOperator;
use fans_core::grid::{Decomposition, Grid};
use fans_core::material::linear::LinearIsotropic;
use fans_core::topology::SingleRankTopology;
use fans_core::MaterialModel;
use num_complex::Complex64;

fn run_convolution() {
    let grid = Grid::new([32, 32, 32], [1.0, 1.0, 1.0]).unwrap();
    let decomp = Decomposition::block(&grid, 0, 1, 1);
    let topo = SingleRankTopology;

    let material = LinearIsotropic::conduction(&[1.0, 5.0]);
    let green = GreenOperator::<1>::build(&grid, &decomp, &material);
    let mut fft = DistributedFft::<1>::new(&grid, &decomp, 1);

    let row_stride = grid.nz + 2;
    let mut real = vec![0.0; decomp.local_n0 * grid.ny * row_stride];
    for (i, v) in real.iter_mut().enumerate() {
        if i % row_stride < grid.nz {
            *v = ((i * 7) % 13) as f64;
        }
    }

    let n_complex = decomp.local_n1 * grid.nx * grid.nz_complex();
    let mut freq = vec![Complex64::new(0.0, 0.0); n_complex];
    fft.forward(&real, &topo, &mut freq);
    fft.convolve(&mut freq, &green);
    fft.inverse(&mut freq, &topo, &mut real);
}

fn bench_convolution(c: &mut Criterion) {
    c.bench_function("convolve_32_cubed_single_rank", |b| b.iter(run_convolution));
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_convolution
}
criterion_main!(benches);
