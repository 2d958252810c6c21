use actix_web::web;

pub mod health;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure_routes);
    // Note: the /ws upgrade route is configured in main.rs so the per-IP
    // rate-limit middleware can wrap just that resource.
}
