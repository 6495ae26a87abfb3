//! Write a binary particle file on rank 0 and read it back on all ranks.
//!
//! Run with `mpirun -n 4 cargo run --example mpi_binary_read --features mpi`.

use amr_particles::{
    comm::{mpi::MpiComm, Communicator},
    config::ParticleConfig,
    container::ParticleContainer,
    geometry::{Geometry, RealBox},
    hierarchy::AmrHierarchy,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn main() {
    env_logger::init();

    // Initialise MPI
    let comm = MpiComm::new().unwrap();

    let geometry = Geometry::new(RealBox::new([0.0; 3], [1.0; 3]), [32, 32, 32], [true; 3]);
    let gdb = AmrHierarchy::uniform(geometry, 8, comm.size());

    let path = std::env::temp_dir().join("amr_particles_mpi_binary_read.bin");
    let npoints = 100_000_i64;

    // Rank 0 writes the file: positions followed by a mass.
    if comm.is_leader() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(bytemuck::bytes_of(&npoints));
        bytes.extend_from_slice(bytemuck::bytes_of(&3_i32));
        bytes.extend_from_slice(bytemuck::bytes_of(&1_i32));
        for _ in 0..npoints {
            let record: [f64; 4] = [rng.gen(), rng.gen(), rng.gen(), 1.0];
            bytes.extend_from_slice(bytemuck::cast_slice(&record));
        }
        std::fs::write(&path, bytes).unwrap();
    }
    comm.barrier();

    let config = ParticleConfig {
        max_readers: 2,
        max_particles_per_read: 10_000,
        verbose: 2,
        ..Default::default()
    };

    let mut container = ParticleContainer::<_, _, 1, 0>::new(&gdb, &comm, config);
    container.init_from_binary_file(&path, 1);

    let total = container.total_count();
    assert!(container.ok());
    assert_eq!(total, npoints as u64);

    if comm.is_leader() {
        println!("Read {} particles on {} ranks.", total, comm.size());
        std::fs::remove_file(&path).unwrap();
    }
}
