/// Three- and four-vector helpers built on [`nalgebra`].
pub mod vectors;
