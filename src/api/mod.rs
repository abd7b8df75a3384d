pub mod eia;
