pub mod python;

pub use python::PythonSteps;
