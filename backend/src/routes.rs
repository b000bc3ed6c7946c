use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put, MethodRouter},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    handlers,
    middleware::{self, methods::*, GateState},
    state::AppState,
};

/// Wraps a route in the authorization gate for `method`. Whether a credential
/// is required is decided by the method table at call time.
fn gated(
    state: &AppState,
    method: &'static str,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(axum_middleware::from_fn_with_state(
        GateState {
            app: state.clone(),
            method,
        },
        middleware::authorization_gate,
    ))
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route(
            "/v1/auth/sign-up",
            gated(&state, AUTH_SIGN_UP, post(handlers::auth::sign_up)),
        )
        .route(
            "/v1/auth/sign-in",
            gated(&state, AUTH_SIGN_IN, post(handlers::auth::sign_in)),
        )
        .route(
            "/v1/auth/refresh",
            gated(&state, AUTH_REFRESH_TOKEN, post(handlers::auth::refresh)),
        )
        .route(
            "/v1/auth/password-reset",
            gated(
                &state,
                AUTH_RESET_PASSWORD,
                post(handlers::auth::reset_password),
            ),
        )
        .route(
            "/v1/auth/password-reset/confirm",
            gated(
                &state,
                AUTH_RESET_PASSWORD_CONFIRM,
                post(handlers::auth::reset_password_confirm),
            ),
        );

    let session_routes = Router::new()
        .route(
            "/v1/sessions",
            gated(&state, SESSION_LIST, get(handlers::sessions::list_sessions)),
        )
        .route(
            "/v1/sessions/{id}",
            gated(
                &state,
                SESSION_DELETE,
                delete(handlers::sessions::delete_session),
            ),
        )
        .route(
            "/v1/sessions/sign-out",
            gated(&state, SESSION_SIGN_OUT, post(handlers::sessions::sign_out)),
        );

    let user_routes = Router::new()
        .route(
            "/v1/users/me",
            gated(&state, USER_GET, get(handlers::users::get_user))
                .merge(gated(&state, USER_UPDATE, patch(handlers::users::update_user))),
        )
        .route(
            "/v1/users",
            gated(&state, USER_LIST, get(handlers::users::list_users)),
        )
        .route(
            "/v1/users/me/verify-token",
            gated(
                &state,
                USER_VERIFY_TOKEN,
                post(handlers::users::verify_token),
            ),
        )
        .route(
            "/v1/users/me/verification-code",
            gated(
                &state,
                USER_SEND_VERIFICATION_CODE,
                post(handlers::users::send_verification_code),
            ),
        )
        .route(
            "/v1/users/me/verify",
            gated(
                &state,
                USER_VERIFY_EMAIL,
                post(handlers::users::verify_email),
            ),
        )
        .route(
            "/v1/users/me/profile",
            gated(&state, USER_GET_PROFILE, get(handlers::users::get_profile)),
        )
        .route(
            "/v1/users/me/email",
            gated(&state, USER_CHANGE_EMAIL, put(handlers::users::change_email)),
        )
        .route(
            "/v1/users/me/password",
            gated(
                &state,
                USER_CHANGE_PASSWORD,
                put(handlers::users::change_password),
            ),
        );

    let api = Router::new()
        .merge(auth_routes)
        .merge(session_routes)
        .merge(user_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::client_gate,
        ));

    // Unknown paths answer 404 whether or not a client header is present.
    Router::new()
        .merge(api)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}
