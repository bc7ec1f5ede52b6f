pub(crate) mod antimeridian;
pub(crate) mod clip;
pub(crate) mod dissolve;
