use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, HttpResponse};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{Principal, Role, SessionStore, SESSION_COOKIE};
use crate::error::Envelope;

const MSG_LOGIN_REQUIRED: &str = "Please login to access this endpoint";
const MSG_CLIENT_DENIED: &str = "CLIENT is not allowed to perform this action";
const MSG_OPS_DENIED: &str = "OPERATIONAL USER is not allowed to perform this action";

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

/// Static role -> endpoint allowlists, built once at startup and shared
/// immutably with the gateway. Default-deny: a path not listed for the
/// caller's role is rejected.
pub struct AccessPolicy {
    public: HashSet<&'static str>,
    client: HashSet<&'static str>,
    ops: HashSet<&'static str>,
    public_prefixes: Vec<&'static str>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self {
            public: [
                "/",
                "/user/signup",
                "/user/request-otp",
                "/user/verify-otp",
                "/user/login",
                "/user/logout",
            ]
            .into_iter()
            .collect(),
            client: ["/file/list", "/file/download"].into_iter().collect(),
            ops: ["/file/upload"].into_iter().collect(),
            // swagger assets live under /docs/*
            public_prefixes: vec!["/docs"],
        }
    }

    /// Decide whether `principal` may reach `path`. Pure and side-effect
    /// free; the same inputs always yield the same decision.
    pub fn decide(&self, path: &str, principal: Option<&Principal>) -> Decision {
        if self.public.contains(path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p))
        {
            return Decision::Allow;
        }
        let principal = match principal {
            Some(p) => p,
            None => return Decision::Deny(MSG_LOGIN_REQUIRED),
        };
        match principal.role {
            Role::Client if self.client.contains(path) => Decision::Allow,
            Role::Client => Decision::Deny(MSG_CLIENT_DENIED),
            Role::Ops if self.ops.contains(path) => Decision::Allow,
            Role::Ops => Decision::Deny(MSG_OPS_DENIED),
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware running the access policy before every handler. It resolves the
/// caller's `Principal` from the session cookie, stashes it in request
/// extensions for the `Auth` extractor, and short-circuits denied requests
/// with a 401 envelope so the handler never runs.
#[derive(Clone)]
pub struct AuthGateway {
    policy: Arc<AccessPolicy>,
    sessions: Arc<SessionStore>,
}

impl AuthGateway {
    pub fn new(policy: Arc<AccessPolicy>, sessions: Arc<SessionStore>) -> Self {
        Self { policy, sessions }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGateway
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGatewayMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGatewayMiddleware {
            service: Rc::new(service),
            policy: self.policy.clone(),
            sessions: self.sessions.clone(),
        }))
    }
}

pub struct AuthGatewayMiddleware<S> {
    service: Rc<S>,
    policy: Arc<AccessPolicy>,
    sessions: Arc<SessionStore>,
}

impl<S, B> Service<ServiceRequest> for AuthGatewayMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let policy = self.policy.clone();
        let sessions = self.sessions.clone();
        Box::pin(async move {
            // a stale or foreign token resolves to no principal at all
            let principal = req
                .request()
                .cookie(SESSION_COOKIE)
                .and_then(|c| sessions.get(c.value()));
            if let Some(p) = principal {
                req.extensions_mut().insert(p);
            }
            // req.path() carries no query string
            match policy.decide(req.path(), principal.as_ref()) {
                Decision::Allow => {
                    let res = svc.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Decision::Deny(message) => {
                    tracing::debug!(path = req.path(), "gateway denied request");
                    let (req, _pl) = req.into_parts();
                    let res = HttpResponse::Unauthorized().json(Envelope::fail(message));
                    Ok(ServiceResponse::new(req, res).map_into_right_body())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Principal {
        Principal { user_id: 1, role: Role::Client }
    }

    fn ops() -> Principal {
        Principal { user_id: 2, role: Role::Ops }
    }

    #[test]
    fn public_paths_need_no_principal() {
        let p = AccessPolicy::new();
        for path in ["/", "/user/signup", "/user/login", "/user/logout", "/user/request-otp", "/user/verify-otp"] {
            assert_eq!(p.decide(path, None), Decision::Allow, "{path}");
            // a principal cannot make a public path worse
            assert_eq!(p.decide(path, Some(&client())), Decision::Allow, "{path}");
            assert_eq!(p.decide(path, Some(&ops())), Decision::Allow, "{path}");
        }
    }

    #[test]
    fn anonymous_is_denied_everywhere_else() {
        let p = AccessPolicy::new();
        for path in ["/file/upload", "/file/list", "/file/download", "/nope"] {
            assert_eq!(p.decide(path, None), Decision::Deny(MSG_LOGIN_REQUIRED), "{path}");
        }
    }

    #[test]
    fn client_role_matrix() {
        let p = AccessPolicy::new();
        let c = client();
        assert_eq!(p.decide("/file/list", Some(&c)), Decision::Allow);
        assert_eq!(p.decide("/file/download", Some(&c)), Decision::Allow);
        assert_eq!(p.decide("/file/upload", Some(&c)), Decision::Deny(MSG_CLIENT_DENIED));
        assert_eq!(p.decide("/unlisted", Some(&c)), Decision::Deny(MSG_CLIENT_DENIED));
    }

    #[test]
    fn ops_role_matrix() {
        let p = AccessPolicy::new();
        let o = ops();
        assert_eq!(p.decide("/file/upload", Some(&o)), Decision::Allow);
        assert_eq!(p.decide("/file/list", Some(&o)), Decision::Deny(MSG_OPS_DENIED));
        assert_eq!(p.decide("/file/download", Some(&o)), Decision::Deny(MSG_OPS_DENIED));
    }

    #[test]
    fn decisions_are_stable_across_calls() {
        let p = AccessPolicy::new();
        let c = client();
        let first = p.decide("/file/upload", Some(&c));
        for _ in 0..100 {
            assert_eq!(p.decide("/file/upload", Some(&c)), first);
        }
    }
}
