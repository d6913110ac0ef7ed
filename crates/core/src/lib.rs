pub mod common;
pub mod config;

pub mod market {
    pub mod entity;
    pub mod error;
    pub mod port;
}

pub mod analysis {
    pub mod entity;
    pub mod error;
}

pub mod signal {
    pub mod entity;
    pub mod error;
    pub mod port;
}

pub mod model {
    pub mod entity;
    pub mod error;
    pub mod port;
}
