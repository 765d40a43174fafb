// errors
pub mod error;

// run configuration
pub mod params;

// data module
pub mod data {
    pub mod spectrum;
    pub mod properties;
    pub mod consensus;
    pub mod cluster;
}

// algorithm module
pub mod algorithm {
    pub mod lsh;
    pub mod similarity;
    pub mod predicate;
    pub mod assessor;
    pub mod engine;
}

// binning module
pub mod binning {
    pub mod binner;
    pub mod parallel;
}

// io module
pub mod io {
    pub mod codec;
    pub mod storage;
}
