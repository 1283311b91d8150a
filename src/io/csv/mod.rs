mod read;

pub(crate) use read::*;
