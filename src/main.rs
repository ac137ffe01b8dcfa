#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let rocket = condo_api::rocket();
    log::info!("Starting Condo API Server");
    rocket
}
