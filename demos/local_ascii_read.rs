//! Read a text particle file on a local universe of threads and replicate it.

use amr_particles::{
    comm::local::LocalUniverse,
    config::ParticleConfig,
    container::ParticleContainer,
    geometry::{Geometry, RealBox},
    hierarchy::AmrHierarchy,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn main() {
    env_logger::init();

    let nranks = 8;
    let geometry = Geometry::new(RealBox::new([0.0; 3], [1.0; 3]), [16, 16, 16], [true; 3]);
    let gdb = AmrHierarchy::uniform(geometry, 4, nranks);

    // Write 1000 particles with a mass each.
    let path = std::env::temp_dir().join("amr_particles_local_ascii_read.txt");
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mut contents = String::from("1000\n");
    for _ in 0..1000 {
        let p: [f64; 3] = rng.gen();
        contents += &format!("{} {} {} 1.0\n", p[0], p[1], p[2]);
    }
    std::fs::write(&path, contents).unwrap();

    let config = ParticleConfig {
        max_readers: 4,
        verbose: 1,
        ..Default::default()
    };

    let counts = LocalUniverse::new(nranks)
        .run(|comm| {
            let mut container = ParticleContainer::<_, _, 1, 0>::new(&gdb, comm, config.clone());
            container.init_from_ascii_file(&path, 1, Some([2, 2, 2]));
            assert!(container.ok());
            container.local_count()
        })
        .unwrap();

    println!(
        "Read and replicated {} particles, per rank {:?}.",
        counts.iter().sum::<usize>(),
        counts
    );

    std::fs::remove_file(&path).unwrap();
}
