mod qiupay_world;
mod setups;
mod steps;

pub use qiupay_world::QiuPayWorld;
