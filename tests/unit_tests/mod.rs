mod assembly;
mod config;
mod constitutive;
