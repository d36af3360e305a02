use std::fmt;

use super::{HttpRoute, RouteInfo};

/// The next step in establishing a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Open a connection to the target.
    ConnectTarget,
    /// Open a connection to the first proxy.
    ConnectProxy,
    /// Tunnel through the proxy chain to the target.
    TunnelTarget,
    /// Tunnel through the current chain to the next proxy.
    TunnelProxy,
    /// Layer a protocol over the established connection.
    LayerProtocol,
    /// The route is established.
    Complete,
    /// The planned route cannot be reached from the established one.
    Unreachable,
}

impl Step {
    /// Returns true for `Complete` and `Unreachable`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Step::Complete | Step::Unreachable)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::ConnectTarget => "connect target",
            Step::ConnectProxy => "connect proxy",
            Step::TunnelTarget => "tunnel target",
            Step::TunnelProxy => "tunnel proxy",
            Step::LayerProtocol => "layer protocol",
            Step::Complete => "complete",
            Step::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Decides how to get from an established route to a planned one.
pub trait RouteDirector: Send + Sync {
    /// The next step to take.
    ///
    /// `fact` is `None`, or has no hops, while nothing is connected.
    fn next_step(&self, plan: &HttpRoute, fact: Option<&dyn RouteInfo>) -> Step;
}

/// The standard route director.
///
/// Established state is never downgraded: a fact that is tunnelled, layered
/// or secure where the plan is not is unreachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicRouteDirector;

impl BasicRouteDirector {
    fn first_step(plan: &HttpRoute) -> Step {
        if plan.hop_count() > 1 {
            Step::ConnectProxy
        } else {
            Step::ConnectTarget
        }
    }

    fn direct_step(plan: &HttpRoute, fact: &dyn RouteInfo) -> Step {
        if fact.hop_count() > 1 {
            return Step::Unreachable;
        }
        if plan.target_host() != fact.target_host() {
            return Step::Unreachable;
        }
        if plan.is_secure() != fact.is_secure() {
            return Step::Unreachable;
        }
        if let Some(local) = plan.local_address() {
            if fact.local_address() != Some(local) {
                return Step::Unreachable;
            }
        }
        Step::Complete
    }

    fn proxied_step(plan: &HttpRoute, fact: &dyn RouteInfo) -> Step {
        if fact.hop_count() <= 1 {
            return Step::Unreachable;
        }
        if plan.target_host() != fact.target_host() {
            return Step::Unreachable;
        }
        let planned = plan.hop_count();
        let established = fact.hop_count();
        if planned < established {
            return Step::Unreachable;
        }
        for hop in 0..established - 1 {
            if plan.hop_target(hop) != fact.hop_target(hop) {
                return Step::Unreachable;
            }
        }
        if planned > established {
            return Step::TunnelProxy;
        }

        if (fact.is_tunnelled() && !plan.is_tunnelled()) || (fact.is_layered() && !plan.is_layered())
        {
            return Step::Unreachable;
        }
        if plan.is_tunnelled() && !fact.is_tunnelled() {
            return Step::TunnelTarget;
        }
        if plan.is_layered() && !fact.is_layered() {
            return Step::LayerProtocol;
        }
        if plan.is_secure() != fact.is_secure() {
            return Step::Unreachable;
        }
        Step::Complete
    }
}

impl RouteDirector for BasicRouteDirector {
    fn next_step(&self, plan: &HttpRoute, fact: Option<&dyn RouteInfo>) -> Step {
        match fact {
            Some(fact) if fact.hop_count() >= 1 => {
                if plan.hop_count() > 1 {
                    Self::proxied_step(plan, fact)
                } else {
                    Self::direct_step(plan, fact)
                }
            }
            _ => Self::first_step(plan),
        }
    }
}
