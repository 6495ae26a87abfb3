//! Generate random particles across MPI ranks, serialized and in parallel.
//!
//! Run with `mpirun -n 4 cargo run --example mpi_random --features mpi`.

use amr_particles::{
    comm::{mpi::MpiComm, Communicator},
    config::ParticleConfig,
    container::ParticleContainer,
    geometry::{Geometry, RealBox},
    hierarchy::AmrHierarchy,
    layout::{BoxLayout, IndexBox},
};

pub fn main() {
    env_logger::init();

    // Initialise MPI
    let comm = MpiComm::new().unwrap();

    let geometry = Geometry::new(
        RealBox::new([-1.0; 3], [1.0; 3]),
        [32, 32, 32],
        [false; 3],
    );
    let mut gdb = AmrHierarchy::uniform(geometry, 8, comm.size());

    // Refine the centre of the domain.
    let nprocs = comm.size();
    gdb.add_level(BoxLayout::chopped(
        IndexBox::new([16, 16, 16], [47, 47, 47]),
        8,
        nprocs,
    ));

    let config = ParticleConfig {
        verbose: 2,
        ..Default::default()
    };

    let mut serialized = ParticleContainer::<_, _, 1, 0>::new(&gdb, &comm, config.clone());
    serialized.init_random(50_000, 3, 1.0, true, None);

    // Both containers draw ids from the rank's allocator, so no (id, cpu) pair repeats.
    let mut parallel = ParticleContainer::<_, _, 1, 0>::new(&gdb, &comm, config);
    parallel.init_random(
        50_000,
        3,
        1.0,
        false,
        Some(RealBox::new([-0.5; 3], [0.5; 3])),
    );

    let serialized_total = serialized.total_count();
    let parallel_total = parallel.total_count();
    assert!(serialized.ok() && parallel.ok());

    if comm.is_leader() {
        println!(
            "Generated {} serialized and {} parallel particles.",
            serialized_total, parallel_total
        );
    }
}
