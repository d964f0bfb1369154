mod analysis;
mod spotify;
mod support;
