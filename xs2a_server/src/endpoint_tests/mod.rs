mod authorisations;
mod helpers;
mod mocks;
mod qwac;
