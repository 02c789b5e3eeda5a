pub mod lazydjango;
pub mod tools;
