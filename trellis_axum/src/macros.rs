//! Macros for building endpoint guards that assert a verified token holds
//! the permissions an endpoint requires

/// Constructs an extractor that verifies the request's bearer token and
/// asserts that it was granted the expected permissions
///
/// In the simplest case, a single permission is required:
///
/// ```
/// use trellis_axum::permission_guard;
///
/// permission_guard!(PostPlants; "post:plants");
/// ```
///
/// Multiple space-separated permissions within one literal must all be
/// held; alternatives can be offered by separating literals with the
/// logical or operator (`||`):
///
/// ```
/// use trellis_axum::permission_guard;
///
/// permission_guard!(
///     EditPlantsOrAdmin;
///     ["edit_or_delete:plants" || "admin"]
/// );
/// ```
///
/// A guard of `*` performs verification only, admitting any valid token:
///
/// ```
/// use trellis_axum::permission_guard;
///
/// permission_guard!(AnyValidToken; *);
/// ```
///
/// Guards are used as handler arguments. Verification runs first: a
/// missing or malformed `Authorization` header, or a token that fails
/// verification, is refused with the matching `401` (or `503`) before the
/// permission check, and a verified token lacking the required permissions
/// is refused with `403`.
///
/// The guard expects the [`Authority`][trellis_oauth2::Authority] to be
/// available through the router state via
/// [`FromRef`][axum::extract::FromRef].
#[macro_export]
macro_rules! permission_guard {
    ($vis:vis $i:ident; *) => {
        $crate::permission_guard!($vis $i($crate::__private::DefaultClaims); *);
    };
    ($vis:vis $i:ident; $permissions:literal) => {
        $crate::permission_guard!($vis $i($crate::__private::DefaultClaims); [$permissions]);
    };
    ($vis:vis $i:ident; [$($permissions:literal)||+ $(,)?]) => {
        $crate::permission_guard!($vis $i($crate::__private::DefaultClaims); [$($permissions)||+]);
    };
    ($vis:vis $i:ident($claims:ty); $permissions:literal) => {
        $crate::permission_guard!($vis $i($claims); [$permissions]);
    };
    ($vis:vis $i:ident($claims:ty); *) => {
        /// A guard that admits any verified token, extracting its claims
        $vis struct $i($vis $claims);

        impl $i {
            #[allow(dead_code)]
            $vis fn into_claims(self) -> $claims {
                self.0
            }

            #[allow(dead_code)]
            $vis fn claims(&self) -> &$claims {
                &self.0
            }
        }

        impl $crate::EndpointPolicy for $i {
            type Claims = $claims;

            fn policy() -> &'static $crate::__private::PermissionPolicy {
                static POLICY: $crate::__private::OnceCell<$crate::__private::PermissionPolicy> =
                    $crate::__private::OnceCell::new();
                POLICY.get_or_init($crate::__private::PermissionPolicy::allow_any)
            }
        }

        #[::axum::async_trait]
        impl<S> ::axum::extract::FromRequestParts<S> for $i
        where
            S: ::std::marker::Send + ::std::marker::Sync,
            $crate::__private::Authority: ::axum::extract::FromRef<S>,
        {
            type Rejection = $crate::AuthRejection;

            async fn from_request_parts(
                parts: &mut ::axum::http::request::Parts,
                state: &S,
            ) -> ::std::result::Result<Self, Self::Rejection> {
                $crate::__private::verify::<$claims, S>(
                    parts,
                    state,
                    <Self as $crate::EndpointPolicy>::policy(),
                )
                .await
                .map(Self)
            }
        }
    };
    ($vis:vis $i:ident($claims:ty); [$($permissions:literal)||+ $(,)?]) => {
        /// A guard asserting that the verified token holds the permissions
        /// required by this endpoint
        ///
        /// The token must satisfy one of the listed alternatives; within an
        /// alternative, every space-separated permission must be held.
        $vis struct $i($vis $claims);

        impl $i {
            #[allow(dead_code)]
            $vis fn into_claims(self) -> $claims {
                self.0
            }

            #[allow(dead_code)]
            $vis fn claims(&self) -> &$claims {
                &self.0
            }
        }

        impl $crate::EndpointPolicy for $i {
            type Claims = $claims;

            fn policy() -> &'static $crate::__private::PermissionPolicy {
                static POLICY: $crate::__private::OnceCell<$crate::__private::PermissionPolicy> =
                    $crate::__private::OnceCell::new();
                POLICY.get_or_init(|| {
                    $crate::__private::PermissionPolicy::deny_all()
                    $(
                        .or_allow_from_static($permissions)
                    )+
                })
            }
        }

        #[::axum::async_trait]
        impl<S> ::axum::extract::FromRequestParts<S> for $i
        where
            S: ::std::marker::Send + ::std::marker::Sync,
            $crate::__private::Authority: ::axum::extract::FromRef<S>,
        {
            type Rejection = $crate::AuthRejection;

            async fn from_request_parts(
                parts: &mut ::axum::http::request::Parts,
                state: &S,
            ) -> ::std::result::Result<Self, Self::Rejection> {
                $crate::__private::verify::<$claims, S>(
                    parts,
                    state,
                    <Self as $crate::EndpointPolicy>::policy(),
                )
                .await
                .map(Self)
            }
        }
    };
}

/// Convenience form for defining several guards at once
///
/// ```
/// use trellis_axum::permission_guards;
///
/// permission_guards! {
///     pub guard PostPlants = "post:plants";
///     pub guard EditOrDeletePlants = "edit_or_delete:plants";
///     pub guard AnyValidToken = *;
/// }
/// ```
///
/// A custom claims type can be applied to every guard in the block:
///
/// ```
/// use trellis_axum::permission_guards;
/// use trellis_oauth2::ClaimsWithPermissions;
///
/// permission_guards! {
///     type Claims = ClaimsWithPermissions;
///
///     pub guard PostObservations = "post:observations";
/// }
/// ```
#[macro_export]
macro_rules! permission_guards {
    (type Claims = $claims:ty; $($defs:tt)*) => {
        $crate::__permission_guards_impl!($claims; $($defs)*);
    };
    ($($defs:tt)*) => {
        $crate::__permission_guards_impl!($crate::__private::DefaultClaims; $($defs)*);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __permission_guards_impl {
    ($claims:ty;) => {};
    ($claims:ty; $vis:vis guard $i:ident = $def:tt; $($rest:tt)*) => {
        $crate::permission_guard!($vis $i($claims); $def);
        $crate::__permission_guards_impl!($claims; $($rest)*);
    };
}
