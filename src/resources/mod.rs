pub mod cloudprofiles;
pub mod controllerregistrations;
pub mod seeds;
pub mod shoots;
