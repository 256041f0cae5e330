use axum::{
    middleware,
    routing::{delete, get, patch, post, put, MethodRouter},
    Router,
};
use std::sync::Arc;

use crate::auth::Role;
use crate::handlers::protected::{self, comments, documents, feedback, groups, subscriptions, users};
use crate::handlers::public;
use crate::middleware::{dispatch, redact_internal_errors, LimitedResource, Pipeline, RequireRole, Validate};
use crate::state::AppState;

/// Attach a stage pipeline to one method route
fn guard(route: MethodRouter<AppState>, pipeline: Pipeline) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(Arc::new(pipeline), dispatch))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Protected API
        .merge(document_routes(&state))
        .merge(group_routes(&state))
        .merge(feedback_routes(&state))
        .merge(comment_routes(&state))
        .merge(user_routes(&state))
        .layer(middleware::from_fn_with_state(
            state.expose_internal_errors,
            redact_internal_errors,
        ))
        .with_state(state)
}

fn document_routes(state: &AppState) -> Router<AppState> {
    let id = || state.protected().stage(Validate::new(protected::id_schema()));

    Router::new()
        .route(
            "/api/documents",
            guard(
                post(documents::create),
                state
                    .protected()
                    .stage(Validate::new(documents::create_schema()))
                    .stage(state.plan_limit(LimitedResource::Documents)),
            ),
        )
        .route(
            "/api/documents",
            guard(get(documents::list), state.protected().stage(Validate::new(documents::list_schema()))),
        )
        .route("/api/documents/:id", guard(get(documents::get), id()))
        .route(
            "/api/documents/:id",
            guard(
                patch(documents::update),
                state.protected().stage(Validate::new(documents::update_schema())),
            ),
        )
        .route("/api/documents/:id", guard(delete(documents::delete), id()))
}

fn group_routes(state: &AppState) -> Router<AppState> {
    let id = || state.protected().stage(Validate::new(protected::id_schema()));

    Router::new()
        .route(
            "/api/groups",
            guard(
                post(groups::create),
                state
                    .protected()
                    .stage(Validate::new(groups::create_schema()))
                    .stage(RequireRole::new(&[Role::Teacher, Role::Admin]))
                    .stage(state.plan_limit(LimitedResource::Groups)),
            ),
        )
        .route("/api/groups", guard(get(groups::list), state.protected()))
        .route("/api/groups/:id", guard(get(groups::get), id()))
        .route(
            "/api/groups/:id/members",
            guard(
                post(groups::add_member),
                state.protected().stage(Validate::new(groups::add_member_schema())),
            ),
        )
        .route(
            "/api/groups/:id/members/:userId",
            guard(
                delete(groups::remove_member),
                state.protected().stage(Validate::new(groups::remove_member_schema())),
            ),
        )
        .route("/api/groups/:id/documents", guard(get(groups::documents), id()))
}

fn feedback_routes(state: &AppState) -> Router<AppState> {
    let id = || state.protected().stage(Validate::new(protected::id_schema()));
    let content = || state.protected().stage(Validate::new(feedback::content_schema()));

    Router::new()
        .route("/api/documents/:id/feedback", guard(post(feedback::create), content()))
        .route("/api/documents/:id/feedback", guard(get(feedback::list), id()))
        .route("/api/feedback/:id", guard(patch(feedback::update), content()))
        .route("/api/feedback/:id", guard(delete(feedback::delete), id()))
}

fn comment_routes(state: &AppState) -> Router<AppState> {
    let id = || state.protected().stage(Validate::new(protected::id_schema()));
    let content = || state.protected().stage(Validate::new(comments::content_schema()));

    Router::new()
        .route("/api/feedback/:id/comments", guard(post(comments::create_on_feedback), content()))
        .route("/api/feedback/:id/comments", guard(get(comments::list_for_feedback), id()))
        .route("/api/documents/:id/comments", guard(post(comments::create_on_document), content()))
        .route("/api/documents/:id/comments", guard(get(comments::list_for_document), id()))
        .route("/api/comments/:id", guard(patch(comments::update), content()))
        .route("/api/comments/:id", guard(delete(comments::delete), id()))
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let admin = || state.protected().stage(RequireRole::new(&[Role::Admin]));

    Router::new()
        .route("/api/users/me", guard(get(users::me), state.protected()))
        .route(
            "/api/users/me",
            guard(
                patch(users::update_me),
                state.protected().stage(Validate::new(users::update_me_schema())),
            ),
        )
        .route("/api/users", guard(get(users::list), admin()))
        .route(
            "/api/users/:id/role",
            guard(
                patch(users::set_role),
                admin().stage(Validate::new(users::set_role_schema())),
            ),
        )
        .route("/api/subscription", guard(get(subscriptions::current), state.protected()))
        .route(
            "/api/users/:id/subscription",
            guard(
                put(subscriptions::set),
                admin().stage(Validate::new(subscriptions::set_schema())),
            ),
        )
}
