//! Tracing context propagation through the Nickel tracing carrier.
//!
//! The carrier is a flat string map. Any OpenTelemetry
//! [`TextMapPropagator`] (W3C TraceContext, B3, ...) can inject into and
//! extract from it through the adapters below.

use std::collections::BTreeMap;

use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, ContextGuard};
use tracing::debug;

use crate::nickel::Nickel;

/// Injector writing into a Nickel tracing carrier.
pub struct CarrierInjector<'a>(pub &'a mut BTreeMap<String, String>);

impl Injector for CarrierInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Extractor reading from a Nickel tracing carrier.
pub struct CarrierExtractor<'a>(pub &'a BTreeMap<String, String>);

impl Extractor for CarrierExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// An open consumer span for the processing of one Nickel.
///
/// The span ends when the scope is dropped, on success and failure paths
/// alike.
pub struct TracingScope {
    cx: Context,
    parented: bool,
}

impl TracingScope {
    /// Context holding the scope's span, for child spans and injection.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// True when the span continues a trace found in the carrier.
    pub fn is_child(&self) -> bool {
        self.parented
    }

    /// Make the scope's context current on this thread until the guard drops.
    pub fn attach(&self) -> ContextGuard {
        self.cx.clone().attach()
    }
}

impl Drop for TracingScope {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

impl Nickel {
    /// Start a consumer span for `operation`.
    ///
    /// When the carrier holds a valid parent span context the new span is
    /// its child. An empty or malformed carrier starts a root span instead;
    /// tracing never aborts processing.
    pub fn extend_scope<P, T>(&self, propagator: &P, tracer: &T, operation: &str) -> TracingScope
    where
        P: TextMapPropagator + ?Sized,
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        let extracted = propagator.extract(&CarrierExtractor(self.tracing_carrier()));
        let parent_valid = extracted.span().span_context().is_valid();

        let builder = tracer
            .span_builder(operation.to_string())
            .with_kind(SpanKind::Consumer);
        let span = if parent_valid {
            builder.start_with_context(tracer, &extracted)
        } else {
            debug!(
                correlation_id = %self.correlation_id(),
                operation,
                "no usable parent in tracing carrier, starting root span"
            );
            builder.start_with_context(tracer, &Context::new())
        };

        TracingScope {
            cx: Context::new().with_span(span),
            parented: parent_valid,
        }
    }

    /// [`Nickel::extend_scope`] with the globally installed propagator and a
    /// tracer from the global provider.
    pub fn extend_scope_global(&self, tracer_name: &'static str, operation: &str) -> TracingScope {
        let tracer = global::tracer(tracer_name);
        global::get_text_map_propagator(|propagator| {
            self.extend_scope(propagator, &tracer, operation)
        })
    }

    /// Write the span context of `cx` into the tracing carrier.
    pub fn inject_tracing<P>(&mut self, propagator: &P, cx: &Context) -> &mut Self
    where
        P: TextMapPropagator + ?Sized,
    {
        propagator.inject_context(cx, &mut CarrierInjector(self.tracing_carrier_mut()));
        self
    }

    /// Write the current context into the tracing carrier using the globally
    /// installed propagator.
    pub fn inject_current_tracing(&mut self) -> &mut Self {
        let cx = Context::current();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&cx, &mut CarrierInjector(self.tracing_carrier_mut()));
        });
        self
    }

    /// Continue `scope`'s trace in this Nickel using the globally installed
    /// propagator.
    pub fn inject_scope(&mut self, scope: &TracingScope) -> &mut Self {
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(
                scope.context(),
                &mut CarrierInjector(self.tracing_carrier_mut()),
            );
        });
        self
    }

    /// Pack a JSON object and inject the tracing context in one step.
    pub fn pack_object_and_inject<P>(
        &mut self,
        object: &serde_json::Map<String, serde_json::Value>,
        propagator: &P,
        cx: &Context,
    ) -> &mut Self
    where
        P: TextMapPropagator + ?Sized,
    {
        self.pack_object(object);
        self.inject_tracing(propagator, cx)
    }

    pub fn pack_array_and_inject<P>(
        &mut self,
        array: &[serde_json::Value],
        propagator: &P,
        cx: &Context,
    ) -> &mut Self
    where
        P: TextMapPropagator + ?Sized,
    {
        self.pack_array(array);
        self.inject_tracing(propagator, cx)
    }

    pub fn pack_bytes_and_inject<P>(
        &mut self,
        bytes: impl Into<bytes::Bytes>,
        propagator: &P,
        cx: &Context,
    ) -> &mut Self
    where
        P: TextMapPropagator + ?Sized,
    {
        self.pack_bytes(bytes);
        self.inject_tracing(propagator, cx)
    }

    /// Pack a JSON object, inject `scope`'s context and end its span.
    ///
    /// For the last step of processing, once the outgoing Nickel is ready.
    pub fn pack_object_inject_and_finish<P>(
        &mut self,
        object: &serde_json::Map<String, serde_json::Value>,
        propagator: &P,
        scope: TracingScope,
    ) -> &mut Self
    where
        P: TextMapPropagator + ?Sized,
    {
        self.pack_object(object);
        self.inject_tracing(propagator, scope.context());
        drop(scope);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use opentelemetry_sdk::trace::TracerProvider;
    use serde_json::json;

    // The provider must outlive its tracer, otherwise spans are no-ops.
    fn tracer() -> (TracerProvider, opentelemetry_sdk::trace::Tracer) {
        let provider = TracerProvider::builder().build();
        let tracer = provider.tracer("nickel-test");
        (provider, tracer)
    }

    #[test]
    fn carrier_injector_overwrites() {
        let mut carrier = BTreeMap::new();
        let mut injector = CarrierInjector(&mut carrier);
        injector.set("traceparent", "old".to_string());
        injector.set("traceparent", "new".to_string());
        assert_eq!(carrier.len(), 1);
        assert_eq!(carrier["traceparent"], "new");
    }

    #[test]
    fn carrier_extractor_reads() {
        let carrier = BTreeMap::from([
            ("traceparent".to_string(), "v1".to_string()),
            ("tracestate".to_string(), "v2".to_string()),
        ]);
        let extractor = CarrierExtractor(&carrier);
        assert_eq!(extractor.get("traceparent"), Some("v1"));
        assert_eq!(extractor.get("baggage"), None);
        assert_eq!(extractor.keys(), vec!["traceparent", "tracestate"]);
    }

    #[test]
    fn empty_carrier_starts_root_span() {
        let propagator = TraceContextPropagator::new();
        let (_provider, tracer) = tracer();
        let n = Nickel::create();

        let scope = n.extend_scope(&propagator, &tracer, "consume");
        assert!(!scope.is_child());
        assert!(scope.context().span().span_context().is_valid());
    }

    #[test]
    fn malformed_carrier_starts_root_span() {
        let propagator = TraceContextPropagator::new();
        let (_provider, tracer) = tracer();
        let mut n = Nickel::create();
        n.tracing_carrier_mut()
            .insert("traceparent".into(), "definitely-not-a-traceparent".into());

        let scope = n.extend_scope(&propagator, &tracer, "consume");
        assert!(!scope.is_child());
    }

    #[test]
    fn injected_context_is_continued() {
        let propagator = TraceContextPropagator::new();
        let (_provider, tracer) = tracer();

        let producer = Nickel::create().extend_scope(&propagator, &tracer, "produce");
        let trace_id = producer.context().span().span_context().trace_id();

        let mut n = Nickel::create();
        n.pack_object_and_inject(
            json!({"k": "v"}).as_object().unwrap(),
            &propagator,
            producer.context(),
        );
        assert!(n.tracing_carrier().contains_key("traceparent"));

        let consumer = n.extend_scope(&propagator, &tracer, "consume");
        assert!(consumer.is_child());
        assert_eq!(
            consumer.context().span().span_context().trace_id(),
            trace_id
        );
    }

    #[test]
    fn array_and_bytes_variants_inject() {
        let propagator = TraceContextPropagator::new();
        let (_provider, tracer) = tracer();
        let producer = Nickel::create().extend_scope(&propagator, &tracer, "produce");

        let mut array = Nickel::create();
        array.pack_array_and_inject(&[json!(1), json!("two")], &propagator, producer.context());
        assert_eq!(array.payload().as_ref(), br#"[1,"two"]"#);
        assert!(array.extend_scope(&propagator, &tracer, "consume").is_child());

        let mut raw = Nickel::create();
        raw.pack_bytes_and_inject(&b"\x00\x01"[..], &propagator, producer.context());
        assert_eq!(raw.payload().as_ref(), b"\x00\x01");
        assert!(raw.extend_scope(&propagator, &tracer, "consume").is_child());
    }

    #[test]
    fn finish_injects_then_ends_span() {
        let propagator = TraceContextPropagator::new();
        let (_provider, tracer) = tracer();
        let incoming = Nickel::create();
        let scope = incoming.extend_scope(&propagator, &tracer, "consume");
        let cx = scope.context().clone();
        assert!(cx.span().is_recording());

        let mut reply = Nickel::for_reply(&incoming);
        reply.pack_object_inject_and_finish(
            json!({"done": true}).as_object().unwrap(),
            &propagator,
            scope,
        );

        assert!(!cx.span().is_recording());
        let continued = reply.extend_scope(&propagator, &tracer, "next");
        assert!(continued.is_child());
        assert_eq!(
            continued.context().span().span_context().trace_id(),
            cx.span().span_context().trace_id()
        );
    }
}
