//! Standard auth listener: the two-step DID sign-in flow.
//!
//! `standard_sign_in` takes a DID document and returns a challenge;
//! `standard_did_auth` takes the signed presentation and returns an access
//! token. `declare_owner` binds a fresh node to its owner DID. All three are
//! open to anyone.

use std::sync::Arc;

use feeds_core::method::{Access, Method};
use feeds_core::obj::{UserInfo, PLACEHOLDER};
use feeds_core::rpc::{
    DeclareOwnerResult, DidAuthResult, Params, Request, ResultPayload, SignInResult,
};
use feeds_core::ErrCode;

use crate::did::{fingerprint, TokenResolver, OWNER_USER_ID};
use crate::service::{reply, CallContext, Listener, MethodTable, Outcome};
use crate::store::FeedsStore;

pub struct StandardAuth {
    table: MethodTable<StandardAuth>,
    resolver: Arc<dyn TokenResolver>,
    store: Arc<FeedsStore>,
}

impl StandardAuth {
    pub fn new(resolver: Arc<dyn TokenResolver>, store: Arc<FeedsStore>) -> Self {
        let table = MethodTable::new()
            .with(Method::StandardSignIn, Self::sign_in)
            .with(Method::StandardDidAuth, Self::did_auth)
            .with(Method::DeclareOwner, Self::declare_owner);
        Self {
            table,
            resolver,
            store,
        }
    }

    fn sign_in(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::StandardSignIn(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        if p.document.is_empty() {
            return Err(ErrCode::InvalidArgument);
        }
        let jwt_challenge = self.resolver.sign_in(&p.document)?;
        tracing::debug!(peer = ctx.peer, "sign-in challenge issued");
        Ok(reply(request, ResultPayload::SignIn(SignInResult { jwt_challenge })))
    }

    fn did_auth(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::StandardDidAuth(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        if p.jwt_vp.is_empty() {
            return Err(ErrCode::InvalidArgument);
        }
        let name = if p.user_name.is_empty() {
            PLACEHOLDER
        } else {
            p.user_name.as_str()
        };
        let (access_token, user) = self.resolver.did_auth(name, &p.jwt_vp)?;
        self.store.upsert_user(&user)?;
        tracing::info!(
            peer = ctx.peer,
            user_id = user.user_id,
            owner = user.is_owner,
            token = %fingerprint(&access_token),
            "peer authenticated"
        );
        Ok(reply(request, ResultPayload::DidAuth(DidAuthResult { access_token })))
    }

    fn declare_owner(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::DeclareOwner(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        if p.nonce.is_empty() || p.owner_did.is_empty() {
            return Err(ErrCode::InvalidArgument);
        }
        if self.resolver.declare_owner(&p.owner_did)? {
            self.store.upsert_user(&UserInfo {
                user_id: OWNER_USER_ID,
                did: p.owner_did.trim().to_string(),
                is_owner: true,
                ..Default::default()
            })?;
            tracing::info!(peer = ctx.peer, owner = %p.owner_did, "owner declared by peer");
        }
        Ok(reply(
            request,
            ResultPayload::DeclareOwner(DeclareOwnerResult {
                phase: "owner_declared".to_string(),
                did: None,
                transaction_payload: None,
            }),
        ))
    }
}

impl Listener for StandardAuth {
    fn name(&self) -> &'static str {
        "standard_auth"
    }

    fn lookup(&self, method: Method) -> Option<Access> {
        self.table.access(method)
    }

    fn handle(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        self.table.dispatch(self, ctx, request)
    }
}
