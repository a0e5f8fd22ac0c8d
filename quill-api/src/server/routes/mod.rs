use crate::server::ServerRouter;

mod accounts;
mod posts;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(accounts::routes())
}
