pub(crate) mod bert;
mod embeddings;
mod encoder;
mod layers;
pub(crate) mod wordpiece;
