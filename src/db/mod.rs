pub mod renewables;
