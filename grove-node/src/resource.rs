//! The sensor, LED and LCD resources and their entity handlers

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use grove_bridge::Bridge;
use grove_proto::{
    DEFAULT_INTERFACE, EntityHandler, EntityHandlerResult, Method, NotifyError, ObservationId,
    ObservationInfo, ObserveAction, Representation, RequestFlags, ResourceHandle,
    ResourcePlatform, ResourceProperties, ResourceRequest, ResourceResponse,
    STATUS_METHOD_NOT_ALLOWED,
};
use tokio::sync::Mutex;

use crate::config::{ObserverFanout, ServerConfig};
use crate::hardware::{Hardware, LedChannel};
use crate::notifier::Notifier;

const TEMPERATURE: &str = "temperature";
const HUMIDITY: &str = "humidity";
const LIGHT: &str = "light";
const LCD: &str = "lcd";

/// Text shown on the LCD until something else is written
pub const INITIAL_LCD_TEXT: &str = "LCD Demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Sensor,
    Led,
    Lcd,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Sensor, ResourceKind::Led, ResourceKind::Lcd];

    pub fn uri(self) -> &'static str {
        match self {
            ResourceKind::Sensor => "/grovepi/sensor",
            ResourceKind::Led => "/grovepi/led",
            ResourceKind::Lcd => "/grovepi/lcd",
        }
    }

    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Sensor => "grovepi.sensor",
            ResourceKind::Led => "grovepi.led",
            ResourceKind::Lcd => "grovepi.lcd",
        }
    }

    /// Field names of the representation, in wire order
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Sensor => &[TEMPERATURE, HUMIDITY, LIGHT],
            ResourceKind::Led => &["red", "green", "blue"],
            ResourceKind::Lcd => &[LCD],
        }
    }

    fn initial_representation(self) -> Representation {
        let mut rep = Representation::new(self.uri());
        match self {
            ResourceKind::Sensor => {
                rep.set_value(TEMPERATURE, 0.0);
                rep.set_value(HUMIDITY, 0.0);
                rep.set_value(LIGHT, 0i64);
            }
            ResourceKind::Led => {
                for channel in LedChannel::ALL {
                    rep.set_value(channel.field(), 0i64);
                }
            }
            ResourceKind::Lcd => rep.set_value(LCD, INITIAL_LCD_TEXT),
        }
        rep
    }
}

struct ResourceState {
    handle: Option<ResourceHandle>,
    representation: Representation,
    observers: BTreeSet<ObservationId>,
    notifier: Option<Notifier>,
}

impl ResourceState {
    fn new(kind: ResourceKind) -> Self {
        Self {
            handle: None,
            representation: kind.initial_representation(),
            observers: BTreeSet::new(),
            notifier: None,
        }
    }
}

struct Inner<B> {
    config: Arc<ServerConfig>,
    hardware: Hardware<B>,
    platform: Arc<dyn ResourcePlatform>,
    sensor: Mutex<ResourceState>,
    led: Mutex<ResourceState>,
    lcd: Mutex<ResourceState>,
}

/// Adapter between the platform and the GrovePi hardware.
///
/// Owns the three resources. Each resource's state sits behind its own lock,
/// so requests on one resource are handled one at a time.
pub struct DemoResource<B> {
    inner: Arc<Inner<B>>,
}

impl<B: Bridge> DemoResource<B> {
    pub fn new(
        config: Arc<ServerConfig>,
        bridge: Arc<B>,
        platform: Arc<dyn ResourcePlatform>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                hardware: Hardware::new(bridge),
                platform,
                sensor: Mutex::new(ResourceState::new(ResourceKind::Sensor)),
                led: Mutex::new(ResourceState::new(ResourceKind::Led)),
                lcd: Mutex::new(ResourceState::new(ResourceKind::Lcd)),
            }),
        }
    }

    /// Register all three resources with the platform.
    ///
    /// A failed registration is logged and leaves that resource unregistered.
    /// Returns how many resources were registered.
    pub async fn create_resources(&self) -> usize {
        let mut properties = ResourceProperties::DISCOVERABLE | ResourceProperties::OBSERVABLE;
        if self.inner.config.secure {
            properties = properties | ResourceProperties::SECURE;
        }

        let mut registered = 0;
        for kind in ResourceKind::ALL {
            let handler = self.handler_for(kind);
            match self.inner.platform.register_resource(
                kind.uri(),
                kind.resource_type(),
                DEFAULT_INTERFACE,
                handler,
                properties,
            ) {
                Ok(handle) => {
                    tracing::info!(uri = kind.uri(), "resource registered");
                    self.inner.state(kind).lock().await.handle = Some(handle);
                    registered += 1;
                }
                Err(e) => {
                    tracing::error!(uri = kind.uri(), error = %e, "resource was not created");
                }
            }
        }
        registered
    }

    /// Handle one platform callback for `kind`
    pub async fn entity_handler(
        &self,
        kind: ResourceKind,
        request: Option<ResourceRequest>,
    ) -> EntityHandlerResult {
        self.inner.entity_handler(kind, request).await
    }

    /// Write `text` to the LCD and cache it on success. Returns the write status.
    pub async fn set_lcd_text(&self, text: &str) -> i32 {
        let mut state = self.inner.lcd.lock().await;
        self.inner.write_lcd(&mut state, text).await
    }

    pub async fn handle(&self, kind: ResourceKind) -> Option<ResourceHandle> {
        self.inner.state(kind).lock().await.handle
    }

    /// Current observers of `kind`, in id order
    pub async fn observers(&self, kind: ResourceKind) -> Vec<ObservationId> {
        self.inner.state(kind).lock().await.observers.iter().copied().collect()
    }

    /// The cached representation, without touching the hardware
    pub async fn representation(&self, kind: ResourceKind) -> Representation {
        self.inner.state(kind).lock().await.representation.clone()
    }

    /// Stop every running notifier
    pub async fn shutdown(&self) {
        for kind in ResourceKind::ALL {
            if let Some(notifier) = self.inner.state(kind).lock().await.notifier.take() {
                notifier.stop();
            }
        }
    }

    fn handler_for(&self, kind: ResourceKind) -> EntityHandler {
        let weak: Weak<Inner<B>> = Arc::downgrade(&self.inner);
        Arc::new(
            move |request: Option<ResourceRequest>| -> BoxFuture<'static, EntityHandlerResult> {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => inner.entity_handler(kind, request).await,
                        None => EntityHandlerResult::Error,
                    }
                }
                .boxed()
            },
        )
    }
}

impl<B: Bridge> Inner<B> {
    fn state(&self, kind: ResourceKind) -> &Mutex<ResourceState> {
        match kind {
            ResourceKind::Sensor => &self.sensor,
            ResourceKind::Led => &self.led,
            ResourceKind::Lcd => &self.lcd,
        }
    }

    async fn entity_handler(
        self: &Arc<Self>,
        kind: ResourceKind,
        request: Option<ResourceRequest>,
    ) -> EntityHandlerResult {
        let uri = kind.uri();
        let Some(request) = request else {
            tracing::warn!(uri, "request invalid");
            return EntityHandlerResult::Error;
        };

        let is_request = request.flags.contains(RequestFlags::REQUEST);
        let is_observer = request.flags.contains(RequestFlags::OBSERVER);
        if !is_request && !is_observer {
            tracing::warn!(uri, "request carries no request or observer flag");
            return EntityHandlerResult::Error;
        }

        let mut result = EntityHandlerResult::Ok;
        if is_request {
            result = self.handle_request(kind, &request).await;
        }
        if is_observer {
            self.handle_observe(kind, request.observation).await;
        }
        result
    }

    async fn handle_request(
        self: &Arc<Self>,
        kind: ResourceKind,
        request: &ResourceRequest,
    ) -> EntityHandlerResult {
        let uri = kind.uri();
        tracing::info!(uri, method = %request.method, "request");
        for (key, value) in &request.query {
            tracing::info!(uri, key = %key, value = %value, "query parameter");
        }

        match (request.method, kind) {
            (Method::Get, ResourceKind::Sensor) if self.config.slow_response => {
                self.defer_response(request.clone());
                EntityHandlerResult::Slow
            }
            (Method::Get, _) | (Method::Post, ResourceKind::Sensor) => {
                let representation = self.refresh(kind).await;
                self.respond(
                    ResourceResponse::for_request(request).with_representation(representation),
                )
            }
            (Method::Put | Method::Post, ResourceKind::Led | ResourceKind::Lcd) => {
                let representation = self.update(kind, &request.representation).await;
                self.respond(
                    ResourceResponse::for_request(request).with_representation(representation),
                )
            }
            (Method::Put, ResourceKind::Sensor) | (Method::Delete, _) => {
                tracing::warn!(uri, method = %request.method, "method not allowed");
                self.respond(
                    ResourceResponse::for_request(request)
                        .with_status(STATUS_METHOD_NOT_ALLOWED)
                        .with_result(EntityHandlerResult::Error),
                );
                EntityHandlerResult::Error
            }
        }
    }

    async fn handle_observe(
        self: &Arc<Self>,
        kind: ResourceKind,
        observation: Option<ObservationInfo>,
    ) {
        let uri = kind.uri();
        let Some(info) = observation else {
            tracing::warn!(uri, "observer flag without observation info");
            return;
        };

        let mut state = self.state(kind).lock().await;
        match info.action {
            ObserveAction::Register => {
                state.observers.insert(info.id);
                tracing::info!(uri, obs_id = %info.id, "observer registered");
                if state.notifier.as_ref().is_none_or(Notifier::is_finished) {
                    state.notifier = self.spawn_notifier(kind);
                }
            }
            ObserveAction::Unregister => {
                state.observers.remove(&info.id);
                tracing::info!(uri, obs_id = %info.id, "observer unregistered");
                if state.observers.is_empty() {
                    if let Some(notifier) = state.notifier.take() {
                        notifier.stop();
                    }
                }
            }
        }
    }

    fn respond(&self, response: ResourceResponse) -> EntityHandlerResult {
        let request_handle = response.request_handle;
        match self.platform.send_response(response) {
            Ok(()) => EntityHandlerResult::Ok,
            Err(e) => {
                tracing::warn!(request = ?request_handle, error = %e, "failed to send response");
                EntityHandlerResult::Error
            }
        }
    }

    /// Rebuild the representation; only the sensor reads from hardware
    async fn refresh(&self, kind: ResourceKind) -> Representation {
        let mut state = self.state(kind).lock().await;
        if kind == ResourceKind::Sensor {
            let temperature = self.hardware.sensor_read_temp().await;
            let humidity = self.hardware.sensor_read_humidity().await;
            let light = self.hardware.sensor_read_light().await;
            state.representation.set_value(TEMPERATURE, temperature);
            state.representation.set_value(HUMIDITY, humidity);
            state.representation.set_value(LIGHT, light);
        }
        state.representation.clone()
    }

    /// Apply the known fields of `incoming` to the hardware
    async fn update(&self, kind: ResourceKind, incoming: &Representation) -> Representation {
        let uri = kind.uri();
        let mut state = self.state(kind).lock().await;
        match kind {
            ResourceKind::Led => {
                for channel in LedChannel::ALL {
                    let field = channel.field();
                    let Some(value) = incoming.get_value::<i64>(field) else {
                        missing_field(uri, incoming, field);
                        continue;
                    };
                    if self.hardware.led_write(channel, value).await == 0 {
                        state.representation.set_value(field, value);
                    } else {
                        tracing::warn!(
                            uri,
                            field,
                            value,
                            "LED write failed, keeping previous value"
                        );
                    }
                }
            }
            ResourceKind::Lcd => match incoming.get_value::<String>(LCD) {
                Some(text) => {
                    self.write_lcd(&mut state, &text).await;
                }
                None => missing_field(uri, incoming, LCD),
            },
            ResourceKind::Sensor => {}
        }
        state.representation.clone()
    }

    async fn write_lcd(&self, state: &mut ResourceState, text: &str) -> i32 {
        let status = self.hardware.lcd_write_str(text).await;
        if status == 0 {
            state.representation.set_value(LCD, text);
        } else {
            tracing::warn!(
                uri = ResourceKind::Lcd.uri(),
                text,
                "LCD write failed, keeping previous value"
            );
        }
        status
    }

    fn defer_response(self: &Arc<Self>, request: ResourceRequest) {
        let weak = Arc::downgrade(self);
        let delay = self.config.slow_response_delay();
        tracing::info!(uri = ResourceKind::Sensor.uri(), ?delay, "deferring response");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let representation = inner.refresh(ResourceKind::Sensor).await;
            inner.respond(
                ResourceResponse::for_request(&request).with_representation(representation),
            );
        });
    }

    fn spawn_notifier(self: &Arc<Self>, kind: ResourceKind) -> Option<Notifier> {
        let interval = self.config.notify_interval()?;
        let weak = Arc::downgrade(self);
        Some(Notifier::spawn(kind.uri(), interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.notify_observers(kind).await,
                    None => ControlFlow::Break(()),
                }
            }
        }))
    }

    async fn notify_observers(&self, kind: ResourceKind) -> ControlFlow<()> {
        let uri = kind.uri();
        let representation = self.refresh(kind).await;

        let mut state = self.state(kind).lock().await;
        let Some(handle) = state.handle else {
            return ControlFlow::Break(());
        };
        let result = match self.config.observers {
            ObserverFanout::All => self.platform.notify_all_observers(handle, &representation),
            ObserverFanout::List => {
                let ids: Vec<ObservationId> = state.observers.iter().copied().collect();
                self.platform.notify_list_of_observers(handle, &ids, &representation)
            }
        };

        match result {
            Ok(count) => {
                tracing::debug!(uri, count, "observers notified");
                ControlFlow::Continue(())
            }
            Err(NotifyError::NoObservers) => {
                tracing::info!(uri, "no more observers, stopping notifications");
                state.observers.clear();
                state.notifier = None;
                ControlFlow::Break(())
            }
            Err(e) => {
                tracing::warn!(uri, error = %e, "notification failed");
                ControlFlow::Continue(())
            }
        }
    }
}

fn missing_field(uri: &str, incoming: &Representation, field: &str) {
    if incoming.has_attribute(field) {
        tracing::warn!(uri, field, "field has an unexpected type, ignored");
    } else {
        tracing::info!(uri, "{field} not found in the representation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use grove_bridge::{MemoryBridge, Scalar};
    use grove_proto::{RegistrationError, RequestHandle, STATUS_OK, SendError};

    use crate::hardware::*;

    /// (handle, listed observers or None for all, representation)
    type Notification = (ResourceHandle, Option<Vec<ObservationId>>, Representation);

    #[derive(Default)]
    struct FakePlatform {
        reject: Option<&'static str>,
        no_observers: AtomicBool,
        registered: std::sync::Mutex<Vec<(String, ResourceProperties, EntityHandler)>>,
        responses: std::sync::Mutex<Vec<ResourceResponse>>,
        notifications: std::sync::Mutex<Vec<Notification>>,
    }

    impl FakePlatform {
        fn responses(&self) -> Vec<ResourceResponse> {
            self.responses.lock().unwrap().clone()
        }

        fn notifications(&self) -> Vec<Notification> {
            self.notifications.lock().unwrap().clone()
        }
    }

    impl ResourcePlatform for FakePlatform {
        fn register_resource(
            &self,
            uri: &str,
            _resource_type: &str,
            _interface: &str,
            handler: EntityHandler,
            properties: ResourceProperties,
        ) -> Result<ResourceHandle, RegistrationError> {
            if self.reject == Some(uri) {
                return Err(RegistrationError::Duplicate(uri.to_string()));
            }
            let mut registered = self.registered.lock().unwrap();
            registered.push((uri.to_string(), properties, handler));
            Ok(ResourceHandle(registered.len() as u32))
        }

        fn send_response(&self, response: ResourceResponse) -> Result<(), SendError> {
            self.responses.lock().unwrap().push(response);
            Ok(())
        }

        fn notify_all_observers(
            &self,
            handle: ResourceHandle,
            representation: &Representation,
        ) -> Result<usize, NotifyError> {
            if self.no_observers.load(Ordering::SeqCst) {
                return Err(NotifyError::NoObservers);
            }
            self.notifications.lock().unwrap().push((handle, None, representation.clone()));
            Ok(1)
        }

        fn notify_list_of_observers(
            &self,
            handle: ResourceHandle,
            observers: &[ObservationId],
            representation: &Representation,
        ) -> Result<usize, NotifyError> {
            self.notifications
                .lock()
                .unwrap()
                .push((handle, Some(observers.to_vec()), representation.clone()));
            Ok(observers.len())
        }
    }

    fn working_bridge() -> MemoryBridge {
        MemoryBridge::new()
            .with_value(SENSOR_READ_TEMP, Scalar::Float(22.5))
            .with_value(SENSOR_READ_HUMIDITY, Scalar::Float(48.0))
            .with_value(SENSOR_READ_LIGHT, Scalar::Int(300))
            .with_value(LED_WRITE_RED, Scalar::Unit)
            .with_value(LED_WRITE_GREEN, Scalar::Unit)
            .with_value(LED_WRITE_BLUE, Scalar::Unit)
            .with_value(LCD_WRITE_STR, Scalar::Unit)
    }

    async fn setup(
        config: ServerConfig,
        bridge: MemoryBridge,
    ) -> (DemoResource<MemoryBridge>, Arc<FakePlatform>, Arc<MemoryBridge>) {
        let platform = Arc::new(FakePlatform::default());
        let bridge = Arc::new(bridge);
        let demo = DemoResource::new(Arc::new(config), bridge.clone(), platform.clone());
        assert_eq!(demo.create_resources().await, 3);
        (demo, platform, bridge)
    }

    async fn request(
        demo: &DemoResource<MemoryBridge>,
        kind: ResourceKind,
        method: Method,
    ) -> ResourceRequest {
        let handle = demo.handle(kind).await.unwrap();
        ResourceRequest::new(RequestHandle(1), handle, method)
    }

    fn led(red: i64, green: i64, blue: i64) -> Representation {
        let mut rep = Representation::new(ResourceKind::Led.uri());
        rep.set_value("red", red);
        rep.set_value("green", green);
        rep.set_value("blue", blue);
        rep
    }

    fn observe(req: ResourceRequest, action: ObserveAction, id: u32) -> ResourceRequest {
        req.with_flags(RequestFlags::NONE).with_observation(action, ObservationId(id))
    }

    #[tokio::test]
    async fn get_returns_declared_fields() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;

        for kind in ResourceKind::ALL {
            let req = request(&demo, kind, Method::Get).await;
            assert_eq!(demo.entity_handler(kind, Some(req)).await, EntityHandlerResult::Ok);
        }

        let responses = platform.responses();
        assert_eq!(responses.len(), 3);
        for (response, kind) in responses.iter().zip(ResourceKind::ALL) {
            assert_eq!(response.status, STATUS_OK);
            let rep = response.representation.as_ref().unwrap();
            assert_eq!(rep.uri(), kind.uri());
            assert_eq!(rep.keys().collect::<Vec<_>>(), kind.fields());
        }

        let sensor = responses[0].representation.as_ref().unwrap();
        assert_eq!(sensor.get_value::<f64>(TEMPERATURE), Some(22.5));
        assert_eq!(sensor.get_value::<i64>(LIGHT), Some(300));
        let lcd = responses[2].representation.as_ref().unwrap();
        assert_eq!(lcd.get_value::<String>(LCD).as_deref(), Some(INITIAL_LCD_TEXT));
    }

    #[tokio::test]
    async fn led_get_does_not_touch_hardware() {
        let (demo, _, bridge) = setup(ServerConfig::default(), working_bridge()).await;
        let req = request(&demo, ResourceKind::Led, Method::Get).await;
        demo.entity_handler(ResourceKind::Led, Some(req)).await;
        assert!(bridge.calls().is_empty());
    }

    #[tokio::test]
    async fn put_led_updates_present_fields_only() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;

        let req = request(&demo, ResourceKind::Led, Method::Put).await
            .with_representation(led(1, 2, 3));
        assert_eq!(
            demo.entity_handler(ResourceKind::Led, Some(req)).await,
            EntityHandlerResult::Ok
        );

        let mut green = Representation::new(ResourceKind::Led.uri());
        green.set_value("green", 5i64);
        let req = request(&demo, ResourceKind::Led, Method::Put).await.with_representation(green);
        assert_eq!(
            demo.entity_handler(ResourceKind::Led, Some(req)).await,
            EntityHandlerResult::Ok
        );

        assert_eq!(demo.representation(ResourceKind::Led).await, led(1, 5, 3));
        let last = platform.responses().pop().unwrap();
        assert_eq!(last.status, STATUS_OK);
        assert_eq!(last.representation, Some(led(1, 5, 3)));
    }

    #[tokio::test]
    async fn failed_led_write_keeps_previous_value() {
        let bridge = MemoryBridge::new().with_value(LED_WRITE_RED, Scalar::Unit);
        let (demo, _, bridge) = setup(ServerConfig::default(), bridge).await;

        let req = request(&demo, ResourceKind::Led, Method::Put).await
            .with_representation(led(7, 9, 11));
        demo.entity_handler(ResourceKind::Led, Some(req)).await;

        assert_eq!(demo.representation(ResourceKind::Led).await, led(7, 0, 0));
        assert_eq!(bridge.calls().len(), 3);
    }

    #[tokio::test]
    async fn put_sensor_is_rejected() {
        let (demo, platform, bridge) = setup(ServerConfig::default(), working_bridge()).await;
        let before = demo.representation(ResourceKind::Sensor).await;

        let mut rep = Representation::new(ResourceKind::Sensor.uri());
        rep.set_value(TEMPERATURE, 99.0);
        let req = request(&demo, ResourceKind::Sensor, Method::Put).await.with_representation(rep);
        assert_eq!(
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await,
            EntityHandlerResult::Error
        );

        assert!(bridge.calls().is_empty());
        assert_eq!(demo.representation(ResourceKind::Sensor).await, before);
        let responses = platform.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, STATUS_METHOD_NOT_ALLOWED);
        assert!(responses[0].representation.is_none());
    }

    #[tokio::test]
    async fn unresolvable_driver_reports_sentinels() {
        let (demo, platform, _) = setup(ServerConfig::default(), MemoryBridge::new()).await;

        let req = request(&demo, ResourceKind::Sensor, Method::Get).await;
        assert_eq!(
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await,
            EntityHandlerResult::Ok
        );

        let rep = platform.responses()[0].representation.clone().unwrap();
        assert_eq!(rep.get_value::<f64>(TEMPERATURE), Some(-1.0));
        assert_eq!(rep.get_value::<f64>(HUMIDITY), Some(-1.0));
        assert_eq!(rep.get_value::<i64>(LIGHT), Some(-1));
    }

    #[tokio::test]
    async fn post_acts_like_get_on_sensor_and_put_elsewhere() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;

        let req = request(&demo, ResourceKind::Sensor, Method::Post).await;
        assert_eq!(
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await,
            EntityHandlerResult::Ok
        );

        let mut text = Representation::new(ResourceKind::Lcd.uri());
        text.set_value(LCD, "hello");
        let req = request(&demo, ResourceKind::Lcd, Method::Post).await.with_representation(text);
        assert_eq!(
            demo.entity_handler(ResourceKind::Lcd, Some(req)).await,
            EntityHandlerResult::Ok
        );

        let responses = platform.responses();
        assert_eq!(
            responses[0].representation.as_ref().unwrap().get_value::<f64>(HUMIDITY),
            Some(48.0)
        );
        assert_eq!(
            responses[1].representation.as_ref().unwrap().get_value::<String>(LCD).as_deref(),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn delete_is_not_allowed() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;
        let req = request(&demo, ResourceKind::Lcd, Method::Delete).await;
        assert_eq!(
            demo.entity_handler(ResourceKind::Lcd, Some(req)).await,
            EntityHandlerResult::Error
        );
        assert_eq!(platform.responses()[0].status, STATUS_METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn invalid_requests_send_nothing() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;

        assert_eq!(
            demo.entity_handler(ResourceKind::Sensor, None).await,
            EntityHandlerResult::Error
        );

        let req = request(&demo, ResourceKind::Sensor, Method::Get).await
            .with_flags(RequestFlags::NONE);
        assert_eq!(
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await,
            EntityHandlerResult::Error
        );

        assert!(platform.responses().is_empty());
    }

    #[tokio::test]
    async fn register_then_unregister_leaves_no_observers() {
        let (demo, _, _) = setup(ServerConfig::default(), working_bridge()).await;

        let req = observe(
            request(&demo, ResourceKind::Led, Method::Get).await,
            ObserveAction::Register,
            4,
        );
        assert_eq!(
            demo.entity_handler(ResourceKind::Led, Some(req)).await,
            EntityHandlerResult::Ok
        );
        assert_eq!(demo.observers(ResourceKind::Led).await, vec![ObservationId(4)]);

        let req = observe(
            request(&demo, ResourceKind::Led, Method::Get).await,
            ObserveAction::Unregister,
            4,
        );
        assert_eq!(
            demo.entity_handler(ResourceKind::Led, Some(req)).await,
            EntityHandlerResult::Ok
        );
        assert!(demo.observers(ResourceKind::Led).await.is_empty());
    }

    #[tokio::test]
    async fn observe_get_responds_and_registers() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;

        let req = request(&demo, ResourceKind::Lcd, Method::Get)
            .await
            .with_observation(ObserveAction::Register, ObservationId(1));
        assert_eq!(
            demo.entity_handler(ResourceKind::Lcd, Some(req)).await,
            EntityHandlerResult::Ok
        );

        assert_eq!(platform.responses().len(), 1);
        assert_eq!(demo.observers(ResourceKind::Lcd).await, vec![ObservationId(1)]);
        demo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn notifier_uses_list_fanout() {
        let config = ServerConfig::default().with_mode(crate::DemoMode::ListOfObservers);
        let (demo, platform, _) = setup(config, working_bridge()).await;

        for id in [2, 9] {
            let req = observe(
                request(&demo, ResourceKind::Sensor, Method::Get).await,
                ObserveAction::Register,
                id,
            );
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await;
        }

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let notifications = platform.notifications();
        assert_eq!(notifications.len(), 1);
        let (handle, ids, rep) = &notifications[0];
        assert_eq!(Some(*handle), demo.handle(ResourceKind::Sensor).await);
        assert_eq!(ids.as_deref(), Some(&[ObservationId(2), ObservationId(9)][..]));
        assert_eq!(rep.get_value::<f64>(TEMPERATURE), Some(22.5));

        for id in [2, 9] {
            let req = observe(
                request(&demo, ResourceKind::Sensor, Method::Get).await,
                ObserveAction::Unregister,
                id,
            );
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await;
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(platform.notifications().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn notifier_stops_when_platform_has_no_observers() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;

        let req = observe(
            request(&demo, ResourceKind::Led, Method::Get).await,
            ObserveAction::Register,
            3,
        );
        demo.entity_handler(ResourceKind::Led, Some(req)).await;

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(platform.notifications().len(), 2);
        assert!(platform.notifications()[0].1.is_none());

        platform.no_observers.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(demo.observers(ResourceKind::Led).await.is_empty());

        platform.no_observers.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(platform.notifications().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_notifications() {
        let config = ServerConfig {
            notify_interval_secs: 0,
            ..ServerConfig::default()
        };
        let (demo, platform, _) = setup(config, working_bridge()).await;

        let req = observe(
            request(&demo, ResourceKind::Led, Method::Get).await,
            ObserveAction::Register,
            3,
        );
        demo.entity_handler(ResourceKind::Led, Some(req)).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(platform.notifications().is_empty());
        assert_eq!(demo.observers(ResourceKind::Led).await, vec![ObservationId(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_is_deferred() {
        let config = ServerConfig::default().with_mode(crate::DemoMode::SlowResponse);
        let (demo, platform, _) = setup(config, working_bridge()).await;

        let req = request(&demo, ResourceKind::Sensor, Method::Get).await;
        assert_eq!(
            demo.entity_handler(ResourceKind::Sensor, Some(req)).await,
            EntityHandlerResult::Slow
        );
        assert!(platform.responses().is_empty());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(platform.responses().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let responses = platform.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].request_handle, RequestHandle(1));
        assert_eq!(
            responses[0].representation.as_ref().unwrap().get_value::<i64>(LIGHT),
            Some(300)
        );

        // only the sensor is slow
        let req = request(&demo, ResourceKind::Led, Method::Get).await;
        assert_eq!(
            demo.entity_handler(ResourceKind::Led, Some(req)).await,
            EntityHandlerResult::Ok
        );
    }

    #[tokio::test]
    async fn lcd_text_is_cached_on_success() {
        let (demo, _, _) = setup(ServerConfig::default(), working_bridge()).await;
        assert_eq!(demo.set_lcd_text("192.168.1.20").await, 0);
        let rep = demo.representation(ResourceKind::Lcd).await;
        assert_eq!(rep.get_value::<String>(LCD).as_deref(), Some("192.168.1.20"));

        let (demo, _, _) = setup(ServerConfig::default(), MemoryBridge::new()).await;
        assert_eq!(demo.set_lcd_text("192.168.1.20").await, -1);
        let rep = demo.representation(ResourceKind::Lcd).await;
        assert_eq!(rep.get_value::<String>(LCD).as_deref(), Some(INITIAL_LCD_TEXT));
    }

    #[tokio::test]
    async fn registration() {
        let platform = Arc::new(FakePlatform {
            reject: Some("/grovepi/led"),
            ..FakePlatform::default()
        });
        let config = ServerConfig::default().with_mode(crate::DemoMode::Secure);
        let demo = DemoResource::new(
            Arc::new(config),
            Arc::new(working_bridge()),
            platform.clone(),
        );

        assert_eq!(demo.create_resources().await, 2);
        assert!(demo.handle(ResourceKind::Led).await.is_none());
        assert!(demo.handle(ResourceKind::Lcd).await.is_some());

        let registered = platform.registered.lock().unwrap();
        assert_eq!(registered[0].0, "/grovepi/sensor");
        assert!(registered[0].1.contains(ResourceProperties::SECURE));
        assert!(registered[0].1.contains(ResourceProperties::OBSERVABLE));
    }

    #[tokio::test]
    async fn registered_handler_reaches_adapter() {
        let (demo, platform, _) = setup(ServerConfig::default(), working_bridge()).await;
        let handler = platform.registered.lock().unwrap()[2].2.clone();

        let req = request(&demo, ResourceKind::Lcd, Method::Get).await;
        assert_eq!(handler(Some(req.clone())).await, EntityHandlerResult::Ok);
        assert_eq!(platform.responses().len(), 1);

        drop(demo);
        assert_eq!(handler(Some(req)).await, EntityHandlerResult::Error);
        assert_eq!(platform.responses().len(), 1);
    }
}
