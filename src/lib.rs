pub mod capture;
pub mod cli;
pub mod error;
pub mod hook;
pub mod packet;
pub mod track;
pub mod wg;
