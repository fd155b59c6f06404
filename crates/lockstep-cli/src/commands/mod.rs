pub mod modules;
pub mod run;
