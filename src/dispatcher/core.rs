use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, error, info, warn};

use crate::context::{Context, MESSAGE_ID_KEY, ROUTE_KEY};
use crate::error::{DropReason, LifecycleError, NotFoundError, RegistrationError};
use crate::executor::{Executor, ExecutorEvent, ExecutorLocal, ExecutorRemote};
use crate::filter::{Filter, FilterChain};
use crate::group::HandlerGroup;
use crate::handler::Handler;
use crate::invoke::MethodKind;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::message::{Message, RemotePacket};
use crate::route::Route;
use crate::runtime_config::{ComponentConfig, RuntimeConfig};
use crate::session::{Application, Event, Session};
use crate::worker_pool::{GroupConfig, ShutdownPolicy, ShutdownReport};

/// Name under which the dispatcher registers with the hosting application.
pub const HANDLER_COMPONENT: &str = "handler_component";

/// Handler-name normalization applied at registration and resolution.
pub type NameNormalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

type FilterList = ArcSwap<Vec<Arc<dyn Filter>>>;

/// What happened to an inbound message or call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Placed on `partition` of the owning group
    Enqueued { partition: usize },
    /// Not placed on any queue
    Dropped(DropReason),
}

impl Dispatch {
    #[must_use]
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Dispatch::Enqueued { .. })
    }

    #[must_use]
    pub fn partition(&self) -> Option<usize> {
        match self {
            Dispatch::Enqueued { partition } => Some(*partition),
            Dispatch::Dropped(_) => None,
        }
    }

    #[must_use]
    pub fn drop_reason(&self) -> Option<&DropReason> {
        match self {
            Dispatch::Enqueued { .. } => None,
            Dispatch::Dropped(reason) => Some(reason),
        }
    }
}

/// A route resolved to the group and handler that own it.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub route: Route,
    pub group: &'a HandlerGroup,
    pub handler: &'a Handler,
}

/// Builder for [`Component`].
pub struct ComponentBuilder {
    app: Arc<dyn Application>,
    before_filters: Vec<Arc<dyn Filter>>,
    after_filters: Vec<Arc<dyn Filter>>,
    normalize: NameNormalizer,
    print_route_log: bool,
    shutdown_policy: ShutdownPolicy,
    group_config: GroupConfig,
}

fn lowercase() -> NameNormalizer {
    Arc::new(|name: &str| name.to_lowercase())
}

impl ComponentBuilder {
    #[must_use]
    pub fn new(app: Arc<dyn Application>) -> Self {
        Self {
            app,
            before_filters: Vec::new(),
            after_filters: Vec::new(),
            normalize: lowercase(),
            print_route_log: false,
            shutdown_policy: ShutdownPolicy::Drain,
            group_config: GroupConfig::default(),
        }
    }

    /// Apply component options from configuration.
    #[must_use]
    pub fn config(mut self, config: &ComponentConfig) -> Self {
        self.print_route_log = config.print_route_log;
        self.shutdown_policy = config.shutdown_policy;
        self.normalize = if config.lowercase_names {
            lowercase()
        } else {
            Arc::new(|name: &str| name.to_string())
        };
        self
    }

    /// Apply component options and the default group settings.
    #[must_use]
    pub fn runtime_config(self, config: &RuntimeConfig) -> Self {
        self.config(&config.component)
            .group_config(config.group.clone())
    }

    #[must_use]
    pub fn before_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.before_filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn after_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.after_filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn name_normalizer<F>(mut self, normalize: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.normalize = Arc::new(normalize);
        self
    }

    #[must_use]
    pub fn print_route_log(mut self, enabled: bool) -> Self {
        self.print_route_log = enabled;
        self
    }

    #[must_use]
    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Settings for groups created by [`Component::register_to_group`].
    #[must_use]
    pub fn group_config(mut self, config: GroupConfig) -> Self {
        self.group_config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Component {
        Component {
            app: self.app,
            groups: Vec::new(),
            before_filters: ArcSwap::from_pointee(self.before_filters),
            after_filters: ArcSwap::from_pointee(self.after_filters),
            normalize: self.normalize,
            print_route_log: self.print_route_log,
            shutdown_policy: self.shutdown_policy,
            group_config: self.group_config,
            lifecycle: Lifecycle::default(),
        }
    }
}

/// Routes local messages, remote calls and events onto handler groups.
///
/// Registration (`register*`, `init`) needs `&mut self` and happens before
/// [`on_after_init`](Self::on_after_init). After that the component is
/// typically shared behind an `Arc` and every dispatch entry point takes `&self`.
pub struct Component {
    app: Arc<dyn Application>,
    groups: Vec<HandlerGroup>,
    before_filters: FilterList,
    after_filters: FilterList,
    normalize: NameNormalizer,
    print_route_log: bool,
    shutdown_policy: ShutdownPolicy,
    group_config: GroupConfig,
    lifecycle: Lifecycle,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("node_id", &self.app.node_id())
            .field("node_type", &self.app.node_type())
            .field("groups", &self.groups)
            .field("before_filters", &self.before_filters.load().len())
            .field("after_filters", &self.after_filters.load().len())
            .field("print_route_log", &self.print_route_log)
            .field("shutdown_policy", &self.shutdown_policy)
            .field("state", &self.state())
            .finish()
    }
}

impl Component {
    /// Component with default options.
    #[must_use]
    pub fn new(app: Arc<dyn Application>) -> Self {
        ComponentBuilder::new(app).build()
    }

    #[must_use]
    pub fn builder(app: Arc<dyn Application>) -> ComponentBuilder {
        ComponentBuilder::new(app)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        HANDLER_COMPONENT
    }

    #[must_use]
    pub fn app(&self) -> &Arc<dyn Application> {
        &self.app
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn groups(&self) -> impl Iterator<Item = &HandlerGroup> {
        self.groups.iter()
    }

    // ---- registration ----

    /// Normalize the group's handler names and append it.
    ///
    /// Groups registered earlier win resolution ties; a name that already
    /// exists in an earlier group is accepted with a warning.
    ///
    /// # Errors
    ///
    /// * [`RegistrationError::Closed`] - the component is already activated
    /// * [`RegistrationError::DuplicateHandler`] / [`RegistrationError::EmptyHandlerName`] -
    ///   see [`HandlerGroup::normalize_names`]
    pub fn register(&mut self, mut group: HandlerGroup) -> Result<(), RegistrationError> {
        if !self.state().accepts_registration() {
            return Err(RegistrationError::Closed);
        }
        group.normalize_names(self.normalize.as_ref())?;

        for handler in group.handlers() {
            if let Some(owner) = self
                .groups
                .iter()
                .find(|g| g.handler(handler.name()).is_some())
            {
                warn!(
                    handler = %handler.name(),
                    group = %group.name(),
                    shadowed_by = %owner.name(),
                    "Handler name already registered; earlier group wins"
                );
            }
        }

        debug!(
            group = %group.name(),
            handlers = group.len(),
            queue_num = group.queue_num(),
            "Handler group registered"
        );
        self.groups.push(group);
        Ok(())
    }

    /// Put `handlers` in a new group built from the component's group settings.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_to_group(
        &mut self,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<(), RegistrationError> {
        let name = format!("group-{}", self.groups.len());
        let group =
            HandlerGroup::with_config(name, self.group_config.clone()).with_handlers(handlers);
        self.register(group)
    }

    /// Append a before-filter. Executors built earlier keep their snapshot.
    pub fn add_before_filter(&self, filter: impl Filter + 'static) {
        append_filter(&self.before_filters, Arc::new(filter));
    }

    /// Append an after-filter. Executors built earlier keep their snapshot.
    pub fn add_after_filter(&self, filter: impl Filter + 'static) {
        append_filter(&self.after_filters, Arc::new(filter));
    }

    #[must_use]
    pub fn before_filters(&self) -> FilterChain {
        FilterChain::from(self.before_filters.load_full())
    }

    #[must_use]
    pub fn after_filters(&self) -> FilterChain {
        FilterChain::from(self.after_filters.load_full())
    }

    // ---- resolution ----

    /// Decode `route` and find the owning group and handler.
    ///
    /// # Errors
    ///
    /// [`NotFoundError`] naming why: decode failure, empty handler name or no match.
    pub fn resolve(&self, route: &str) -> Result<Resolved<'_>, NotFoundError> {
        let route = Route::decode(route)?;
        let (group, handler) = self.find_handler(&route)?;
        Ok(Resolved {
            route,
            group,
            handler,
        })
    }

    fn find_handler(&self, route: &Route) -> Result<(&HandlerGroup, &Handler), NotFoundError> {
        let name = (self.normalize)(route.handler_name());
        if name.is_empty() {
            return Err(NotFoundError::EmptyHandlerName {
                route: route.to_string(),
            });
        }

        self.groups
            .iter()
            .find_map(|group| group.handler(&name).map(|handler| (group, handler)))
            .ok_or_else(|| NotFoundError::NoHandler {
                route: route.to_string(),
                handler: name,
            })
    }

    // ---- dispatch ----

    /// Route a client message to its local method.
    ///
    /// Checks, in order: the application is running, session and message are
    /// present, the route parses, its node type is this server's, and it
    /// resolves to a local method. Any failure drops the message with a log
    /// line and is reported as [`Dispatch::Dropped`]; nothing here panics or
    /// touches the session.
    pub fn process_local(
        &self,
        session: Option<Arc<dyn Session>>,
        message: Option<Arc<Message>>,
    ) -> Dispatch {
        if !self.app.running() {
            return Dispatch::Dropped(DropReason::NotRunning);
        }

        let Some(session) = session else {
            debug!("Local message dropped: session is missing");
            return Dispatch::Dropped(DropReason::MissingSession);
        };

        let Some(message) = message else {
            warn!(sid = %session.sid(), "Local message dropped: message is missing");
            return Dispatch::Dropped(DropReason::MissingMessage);
        };

        let route = match message.parse_route() {
            Ok(route) => route,
            Err(err) => {
                warn!(
                    sid = %session.sid(),
                    route = %message.route,
                    error = %err,
                    "Local message dropped: route decode error"
                );
                return Dispatch::Dropped(DropReason::Route(err));
            }
        };

        if route.node_type() != self.app.node_type() {
            warn!(
                sid = %session.sid(),
                route = %message.route,
                node_type = %self.app.node_type(),
                "Local message dropped: node type mismatch"
            );
            return Dispatch::Dropped(DropReason::NodeTypeMismatch {
                expected: self.app.node_type().to_string(),
                actual: route.node_type().to_string(),
            });
        }

        let (group, handler) = match self.find_handler(route) {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    sid = %session.sid(),
                    route = %message.route,
                    error = %err,
                    "Local message dropped: no handler for route"
                );
                return Dispatch::Dropped(err.into());
            }
        };

        let Some(handler_fn) = handler.local_handler(route.method()) else {
            debug!(
                sid = %session.sid(),
                route = %message.route,
                method = %route.method(),
                "Local message dropped: no such local method"
            );
            return Dispatch::Dropped(
                NotFoundError::NoMethod {
                    handler: handler.name().to_string(),
                    method: route.method().to_string(),
                    kind: MethodKind::Local,
                }
                .into(),
            );
        };

        let context = Context::new()
            .with_value(MESSAGE_ID_KEY, message.id.to_string())
            .with_value(ROUTE_KEY, message.route.clone());
        let sid = session.sid().to_string();

        let executor = Executor::Local(ExecutorLocal {
            app: Arc::clone(&self.app),
            session,
            message: Arc::clone(&message),
            handler_fn: Arc::clone(handler_fn),
            context,
            before_filters: self.before_filters(),
            after_filters: self.after_filters(),
        });

        match group.dispatch(executor) {
            Ok(partition) => {
                if self.print_route_log {
                    debug!(
                        sid = %sid,
                        group = %group.name(),
                        partition,
                        route = %message.route,
                        "[local handler]"
                    );
                }
                Dispatch::Enqueued { partition }
            }
            Err(err) => {
                warn!(
                    sid = %sid,
                    route = %message.route,
                    error = %err,
                    "Local message dropped: enqueue failed"
                );
                Dispatch::Dropped(err.into())
            }
        }
    }

    /// Resolve a remote packet to its group and a ready executor.
    ///
    /// # Errors
    ///
    /// [`NotFoundError`] when the route does not decode or names no remote method.
    pub fn remote_executor(
        &self,
        packet: RemotePacket,
    ) -> Result<(&HandlerGroup, ExecutorRemote), NotFoundError> {
        let route = Route::decode(&packet.route)?;
        let (group, handler) = self.find_handler(&route)?;
        let handler_fn = handler
            .remote_handler(route.method())
            .ok_or_else(|| NotFoundError::NoMethod {
                handler: handler.name().to_string(),
                method: route.method().to_string(),
                kind: MethodKind::Remote,
            })?;

        let context = Context::new().with_value(ROUTE_KEY, packet.route.clone());
        Ok((
            group,
            ExecutorRemote {
                app: Arc::clone(&self.app),
                packet,
                handler_fn: Arc::clone(handler_fn),
                context,
            },
        ))
    }

    /// Enqueue a remote call the RPC layer already resolved.
    pub fn process_remote(&self, group: &HandlerGroup, executor: ExecutorRemote) -> Dispatch {
        if !self.app.running() {
            return Dispatch::Dropped(DropReason::NotRunning);
        }

        let route = executor.packet.route.clone();
        let data_len = executor.packet.data.len();
        match group.dispatch(Executor::Remote(executor)) {
            Ok(partition) => {
                if self.print_route_log {
                    debug!(
                        group = %group.name(),
                        partition,
                        route = %route,
                        data_len,
                        "[remote handler]"
                    );
                }
                Dispatch::Enqueued { partition }
            }
            Err(err) => {
                warn!(route = %route, error = %err, "Remote call dropped: enqueue failed");
                Dispatch::Dropped(err.into())
            }
        }
    }

    /// Resolve and enqueue a remote packet in one step.
    pub fn dispatch_remote(&self, packet: RemotePacket) -> Dispatch {
        if !self.app.running() {
            return Dispatch::Dropped(DropReason::NotRunning);
        }
        match self.remote_executor(packet) {
            Ok((group, executor)) => self.process_remote(group, executor),
            Err(err) => {
                warn!(error = %err, "Remote call dropped: no remote method for route");
                Dispatch::Dropped(err.into())
            }
        }
    }

    /// Fan an event out to every subscribed handler in every group.
    ///
    /// Each subscribed handler gets its own executor on its group's partition
    /// for the event. Returns how many executors were enqueued; `None` is a
    /// no-op.
    pub fn post_event(&self, event: Option<Arc<dyn Event>>) -> usize {
        let Some(event) = event else {
            return 0;
        };

        let mut enqueued = 0;
        for group in &self.groups {
            for handler in group.handlers() {
                let Some(subscribers) = handler.event(event.name()) else {
                    continue;
                };

                let executor = Executor::Event(ExecutorEvent {
                    event: Arc::clone(&event),
                    handler_name: handler.name().to_string(),
                    subscribers: subscribers.to_vec(),
                });
                match group.dispatch(executor) {
                    Ok(partition) => {
                        enqueued += 1;
                        if self.print_route_log {
                            debug!(
                                group = %group.name(),
                                partition,
                                handler = %handler.name(),
                                event = %event.name(),
                                "[event handler]"
                            );
                        }
                    }
                    Err(err) => {
                        warn!(
                            group = %group.name(),
                            handler = %handler.name(),
                            event = %event.name(),
                            error = %err,
                            "Event dropped: enqueue failed"
                        );
                    }
                }
            }
        }
        enqueued
    }

    // ---- lifecycle ----

    /// Notify every handler's `on_init`. Groups do not run yet.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] unless the component is `Created`.
    pub fn init(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle
            .transition(LifecycleState::Created, LifecycleState::Initialized)?;
        for group in &self.groups {
            group.notify_init();
        }
        Ok(())
    }

    /// Start every registered group and close registration.
    ///
    /// If a group fails to start, every handler gets `on_stop`, every group is
    /// halted and the component ends `Stopped`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] unless `Initialized`, or
    /// [`LifecycleError::Pool`] when a worker could not be spawned.
    pub fn on_after_init(&self) -> Result<(), LifecycleError> {
        self.lifecycle
            .transition(LifecycleState::Initialized, LifecycleState::Activated)?;

        for group in &self.groups {
            if let Err(err) = group.run(&self.app) {
                error!(group = %group.name(), error = %err, "Failed to start handler group");
                for stopping in &self.groups {
                    stopping.notify_stop();
                }
                for stopping in &self.groups {
                    stopping.shutdown(ShutdownPolicy::Halt);
                }
                if let Err(stop_err) = self.lifecycle.stop() {
                    warn!(error = %stop_err, "Component already stopped during failed activation");
                }
                return Err(err.into());
            }
        }

        info!(
            component = HANDLER_COMPONENT,
            node_id = %self.app.node_id(),
            node_type = %self.app.node_type(),
            groups = self.groups.len(),
            "Handler component activated"
        );
        Ok(())
    }

    /// Notify every handler's `on_stop`, then shut every group down per the
    /// configured [`ShutdownPolicy`].
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] when already stopped.
    pub fn on_stop(&self) -> Result<Vec<ShutdownReport>, LifecycleError> {
        self.lifecycle.stop()?;

        for group in &self.groups {
            group.notify_stop();
        }

        let reports: Vec<ShutdownReport> = self
            .groups
            .iter()
            .map(|group| group.shutdown(self.shutdown_policy))
            .collect();

        info!(
            component = HANDLER_COMPONENT,
            policy = ?self.shutdown_policy,
            processed = reports.iter().map(|r| r.processed).sum::<u64>(),
            abandoned = reports.iter().map(|r| r.abandoned).sum::<u64>(),
            "Handler component stopped"
        );
        Ok(reports)
    }
}

fn append_filter(list: &FilterList, filter: Arc<dyn Filter>) {
    list.rcu(|current| {
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&filter));
        next
    });
}
