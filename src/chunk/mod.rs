pub mod chunk_codec;
pub mod reassembly;
