//! Failure-path behavior across a full encode/decode pipeline: abort
//! markers, hook failures, graph validation, and reads past the end of a
//! custom section.

use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use object_graph_core::{
    DecodeContext, DecodeHook, EncodeContext, EncodeHook, PrimKind, PrimValue, RecordValue,
    StreamError, StreamResult, TypeDescriptor, TypeRegistration, TypeRegistry, Value,
};
use object_graph_stream::{Decoder, Encoder};

fn record_value(desc: &Arc<TypeDescriptor>) -> (Value, Rc<RefCell<RecordValue>>) {
    let value = Value::record(Arc::clone(desc));
    let rc = match &value {
        Value::Record(rc) => Rc::clone(rc),
        other => panic!("expected a record, got {other:?}"),
    };
    (value, rc)
}

fn as_record(value: &Value) -> Rc<RefCell<RecordValue>> {
    match value {
        Value::Record(rc) => Rc::clone(rc),
        other => panic!("expected a record, got {other:?}"),
    }
}

fn as_str(value: &Value) -> Rc<str> {
    match value {
        Value::Str(s) => Rc::clone(s),
        other => panic!("expected a string, got {other:?}"),
    }
}

fn prim_of(record: &Rc<RefCell<RecordValue>>, field: &str) -> PrimValue {
    match record.borrow().get(field).unwrap() {
        Value::Prim(p) => p,
        other => panic!("field {field} is not a primitive: {other:?}"),
    }
}

#[test]
fn test_abort_marker_travels_and_both_sides_recover() {
    let packet_desc = TypeDescriptor::builder("relay.Packet")
        .ref_field("payload")
        .build()
        .unwrap();
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(TypeRegistration::new(Arc::clone(&packet_desc)))
        .unwrap();

    let shared = Value::str("KEEP");
    let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
    encoder.write_value(&shared).unwrap();

    // A primitive smuggled into a reference slot is unencodable.
    let (packet, packet_rc) = record_value(&packet_desc);
    packet_rc.borrow_mut().values_mut()[0] = Value::from(5i32);
    let err = encoder.write_value(&packet).unwrap_err();
    assert!(matches!(err, StreamError::Protocol { .. }));

    // The session keeps going after the abort.
    encoder.write_value(&shared).unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    let before = as_str(&decoder.read_value().unwrap());

    let aborted = decoder.read_value().unwrap_err();
    assert!(!aborted.is_fatal(), "a peer abort only loses one root");
    match &aborted {
        StreamError::PeerAborted { message } => {
            assert!(
                message.contains("reference position"),
                "the writer's failure travels in the marker: {message}"
            );
        }
        other => panic!("expected a peer abort, got {other:?}"),
    }

    let after = as_str(&decoder.read_value().unwrap());
    assert_eq!(before, after);
    assert!(
        !Rc::ptr_eq(&before, &after),
        "both sides drop their handle tables at the abort"
    );
    println!("pipeline recovered on both sides of the abort");
}

struct RefusingWriter;

impl EncodeHook for RefusingWriter {
    fn encode(&self, _ctx: &mut dyn EncodeContext) -> StreamResult<()> {
        Err(StreamError::hook("fail.Widget", "refusing to serialize"))
    }
}

struct WidgetReader;

impl DecodeHook for WidgetReader {
    fn decode(&self, ctx: &mut dyn DecodeContext) -> StreamResult<()> {
        ctx.read_value()?;
        Ok(())
    }
}

#[test]
fn test_encode_hook_failure_reaches_the_reader() {
    let widget_desc = TypeDescriptor::builder("fail.Widget")
        .custom_encode()
        .custom_decode()
        .build()
        .unwrap();
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(
            TypeRegistration::new(Arc::clone(&widget_desc))
                .with_encode_hook(Arc::new(RefusingWriter))
                .with_decode_hook(Arc::new(WidgetReader)),
        )
        .unwrap();

    let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
    let (widget, _) = record_value(&widget_desc);
    let err = encoder.write_value(&widget).unwrap_err();
    assert!(
        matches!(&err, StreamError::HookFailed { type_name, message }
            if type_name == "fail.Widget" && message == "refusing to serialize")
    );
    encoder.write_value(&Value::str("after")).unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    match decoder.read_value().unwrap_err() {
        StreamError::PeerAborted { message } => {
            assert!(
                message.contains("refusing to serialize"),
                "the hook failure rides the abort marker: {message}"
            );
        }
        other => panic!("expected a peer abort, got {other:?}"),
    }
    assert!(matches!(decoder.read_value().unwrap(), Value::Str(s) if &*s == "after"));
}

struct DefaultOnlyWriter;

impl EncodeHook for DefaultOnlyWriter {
    fn encode(&self, ctx: &mut dyn EncodeContext) -> StreamResult<()> {
        ctx.default_write()
    }
}

struct OrderProbeReader {
    order: Arc<Mutex<Vec<i32>>>,
}

impl DecodeHook for OrderProbeReader {
    fn decode(&self, ctx: &mut dyn DecodeContext) -> StreamResult<()> {
        ctx.default_read()?;
        for (priority, marker) in [(1, 10), (5, 50), (5, 51)] {
            let order = Arc::clone(&self.order);
            ctx.register_validation(
                Box::new(move || -> StreamResult<()> {
                    order.lock().unwrap().push(marker);
                    Ok(())
                }),
                priority,
            );
        }
        Ok(())
    }
}

fn custom_registry(
    name: &str,
    decode_hook: Arc<dyn DecodeHook>,
) -> (Arc<TypeRegistry>, Arc<TypeDescriptor>) {
    let desc = TypeDescriptor::builder(name)
        .prim_field("n", PrimKind::I32)
        .custom_encode()
        .custom_decode()
        .build()
        .unwrap();
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(
            TypeRegistration::new(Arc::clone(&desc))
                .with_encode_hook(Arc::new(DefaultOnlyWriter))
                .with_decode_hook(decode_hook),
        )
        .unwrap();
    (registry, desc)
}

#[test]
fn test_validation_runs_by_priority_then_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (registry, desc) = custom_registry(
        "audit.Entry",
        Arc::new(OrderProbeReader {
            order: Arc::clone(&order),
        }),
    );

    let (entry, entry_rc) = record_value(&desc);
    entry_rc.borrow_mut().set("n", Value::from(3i32)).unwrap();
    let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
    encoder.write_value(&entry).unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    let decoded = as_record(&decoder.read_value().unwrap());
    assert_eq!(prim_of(&decoded, "n"), PrimValue::I32(3));
    assert_eq!(
        order.lock().unwrap().as_slice(),
        &[50, 51, 10],
        "higher priority first, ties in registration order"
    );
    println!("validation order: {:?}", order.lock().unwrap());
}

struct FailingValidationReader {
    order: Arc<Mutex<Vec<i32>>>,
}

impl DecodeHook for FailingValidationReader {
    fn decode(&self, ctx: &mut dyn DecodeContext) -> StreamResult<()> {
        ctx.default_read()?;
        ctx.register_validation(
            Box::new(|| -> StreamResult<()> {
                Err(StreamError::ValidationFailed {
                    message: "checksum disagrees".to_string(),
                })
            }),
            10,
        );
        let order = Arc::clone(&self.order);
        ctx.register_validation(
            Box::new(move || -> StreamResult<()> {
                order.lock().unwrap().push(1);
                Ok(())
            }),
            1,
        );
        Ok(())
    }
}

#[test]
fn test_validation_failure_abandons_later_callbacks() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (registry, desc) = custom_registry(
        "audit.Strict",
        Arc::new(FailingValidationReader {
            order: Arc::clone(&order),
        }),
    );

    let (entry, _) = record_value(&desc);
    let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
    encoder.write_value(&entry).unwrap();
    encoder.write_value(&Value::str("onward")).unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    let err = decoder.read_value().unwrap_err();
    assert!(!err.is_fatal());
    assert!(
        matches!(&err, StreamError::ValidationFailed { message } if message == "checksum disagrees")
    );
    assert!(
        order.lock().unwrap().is_empty(),
        "the failure must drop the lower-priority callback"
    );

    // Validation runs after the graph is read; the stream stays usable.
    assert!(matches!(decoder.read_value().unwrap(), Value::Str(s) if &*s == "onward"));
}

struct SoakWriter;

impl EncodeHook for SoakWriter {
    fn encode(&self, ctx: &mut dyn EncodeContext) -> StreamResult<()> {
        ctx.default_write()?;
        ctx.write_i32(1)
    }
}

struct SoakReader {
    got: Arc<Mutex<Vec<i32>>>,
}

impl DecodeHook for SoakReader {
    fn decode(&self, ctx: &mut dyn DecodeContext) -> StreamResult<()> {
        ctx.default_read()?;
        loop {
            match ctx.read_i32() {
                Ok(v) => self.got.lock().unwrap().push(v),
                Err(StreamError::EndOfCustomData) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[test]
fn test_reading_to_end_of_custom_data_is_recoverable() {
    let got = Arc::new(Mutex::new(Vec::new()));
    let desc = TypeDescriptor::builder("soak.Probe")
        .prim_field("n", PrimKind::I32)
        .custom_encode()
        .custom_decode()
        .build()
        .unwrap();
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(
            TypeRegistration::new(Arc::clone(&desc))
                .with_encode_hook(Arc::new(SoakWriter))
                .with_decode_hook(Arc::new(SoakReader {
                    got: Arc::clone(&got),
                })),
        )
        .unwrap();

    let (probe, probe_rc) = record_value(&desc);
    probe_rc.borrow_mut().set("n", Value::from(8i32)).unwrap();
    let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
    encoder.write_value(&probe).unwrap();
    encoder.write_value(&Value::str("next")).unwrap();
    let bytes = encoder.finish().unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    let decoded = as_record(&decoder.read_value().unwrap());
    assert_eq!(prim_of(&decoded, "n"), PrimValue::I32(8));
    assert_eq!(got.lock().unwrap().as_slice(), &[1]);
    assert!(matches!(decoder.read_value().unwrap(), Value::Str(s) if &*s == "next"));
}

struct IgnoringReader;

impl DecodeHook for IgnoringReader {
    fn decode(&self, _ctx: &mut dyn DecodeContext) -> StreamResult<()> {
        Ok(())
    }
}

#[test]
fn test_skipped_default_read_leaves_defaults_and_alignment() {
    // The writer's type is plain; only the reader upgraded to a hook.
    let wire_desc = TypeDescriptor::builder("tune.Knob")
        .prim_field("level", PrimKind::I32)
        .build()
        .unwrap();
    let (knob, knob_rc) = record_value(&wire_desc);
    knob_rc.borrow_mut().set("level", Value::from(7i32)).unwrap();

    let writer_registry = Arc::new(TypeRegistry::new());
    let mut encoder = Encoder::new(Vec::new(), writer_registry).unwrap();
    encoder.write_value(&knob).unwrap();
    encoder.write_value(&Value::str("sentinel")).unwrap();
    let bytes = encoder.finish().unwrap();

    let local_desc = TypeDescriptor::builder("tune.Knob")
        .prim_field("level", PrimKind::I32)
        .custom_decode()
        .build()
        .unwrap();
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(
            TypeRegistration::new(local_desc).with_decode_hook(Arc::new(IgnoringReader)),
        )
        .unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    let decoded = as_record(&decoder.read_value().unwrap());
    assert_eq!(
        prim_of(&decoded, "level"),
        PrimValue::I32(0),
        "a hook that never asks for the fields forfeits them"
    );
    assert!(matches!(decoder.read_value().unwrap(), Value::Str(s) if &*s == "sentinel"));
    println!("field section discarded without losing alignment");
}

struct PastFieldsReader {
    saw_end: Arc<Mutex<bool>>,
}

impl DecodeHook for PastFieldsReader {
    fn decode(&self, ctx: &mut dyn DecodeContext) -> StreamResult<()> {
        ctx.default_read()?;
        match ctx.read_i32() {
            Err(StreamError::EndOfCustomData) => {
                *self.saw_end.lock().unwrap() = true;
                Ok(())
            }
            Ok(v) => panic!("no custom payload exists, yet read {v}"),
            Err(e) => Err(e),
        }
    }
}

#[test]
fn test_hook_reads_past_plain_fields_see_end_of_custom_data() {
    let wire_desc = TypeDescriptor::builder("tune.Knob")
        .prim_field("level", PrimKind::I32)
        .build()
        .unwrap();
    let (knob, knob_rc) = record_value(&wire_desc);
    knob_rc.borrow_mut().set("level", Value::from(7i32)).unwrap();

    let writer_registry = Arc::new(TypeRegistry::new());
    let mut encoder = Encoder::new(Vec::new(), writer_registry).unwrap();
    encoder.write_value(&knob).unwrap();
    encoder.write_value(&Value::str("sentinel")).unwrap();
    let bytes = encoder.finish().unwrap();

    let saw_end = Arc::new(Mutex::new(false));
    let local_desc = TypeDescriptor::builder("tune.Knob")
        .prim_field("level", PrimKind::I32)
        .custom_decode()
        .build()
        .unwrap();
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(
            TypeRegistration::new(local_desc).with_decode_hook(Arc::new(PastFieldsReader {
                saw_end: Arc::clone(&saw_end),
            })),
        )
        .unwrap();

    let mut decoder = Decoder::new(Cursor::new(bytes), registry).unwrap();
    let decoded = as_record(&decoder.read_value().unwrap());
    assert_eq!(prim_of(&decoded, "level"), PrimValue::I32(7));
    assert!(*saw_end.lock().unwrap());
    assert!(matches!(decoder.read_value().unwrap(), Value::Str(s) if &*s == "sentinel"));
}
