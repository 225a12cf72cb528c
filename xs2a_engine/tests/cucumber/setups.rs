use std::str::FromStr;

use cucumber::given;
use xs2a_engine::db_types::{ScaMethod, TppRole};

use crate::cucumber::{ScaSystem, ScaWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut ScaWorld) {
    let system = ScaSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a TPP with roles {string}")]
async fn tpp_with_roles(world: &mut ScaWorld, roles: String) {
    let roles = roles
        .split(',')
        .map(|r| TppRole::from_str(r.trim()).expect("Not a TPP role"))
        .collect::<Vec<_>>();
    world.tpp = Some(xs2a_engine::certificate::TppIdentity::new("PSDDE-BAFIN-000001", roles));
}

#[given(expr = "the bank offers the SCA methods {string}")]
async fn bank_methods(world: &mut ScaWorld, methods: String) {
    let methods = methods
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| ScaMethod::new(m, format!("{}_OTP", m.to_uppercase())))
        .collect();
    world.system().bank.script().methods = methods;
}

#[given("the bank exempts the PSU from SCA")]
async fn bank_exempts(world: &mut ScaWorld) {
    world.system().bank.script().sca_exempted = true;
}
