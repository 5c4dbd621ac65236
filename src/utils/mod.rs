mod id_gen;

pub use id_gen::IdGenerator;
