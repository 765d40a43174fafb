// errors
pub mod error;

// configuration file handling
pub mod config;

// io module
pub mod io {
    pub mod json_source;
    pub mod msp_writer;
}

// load, cluster, write
pub mod pipeline;
