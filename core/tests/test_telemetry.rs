#[cfg(test)]
mod telemetry_tests {
    use std::rc::Rc;
    use std::time::Duration;

    use graphwire_core::prelude::*;
    use graphwire_core::telemetry::SessionTimer;

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn collab(types: &[&TypeRef]) -> Collaborators {
        let mut reg = TypeRegistry::new();
        for t in types {
            reg.register_hierarchy(t);
        }
        Collaborators::new(Rc::new(reg))
    }

    fn shared_graph() -> Value {
        let s = Value::str("shared");
        Value::object(Object::Array(ArrayValue::Object {
            component: ComponentType::String,
            elements: vec![s.clone(), s.clone(), s],
        }))
    }

    #[test]
    fn test_encoder_and_decoder_counters_agree() {
        init_logging();
        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), collab(&[])).unwrap();
        enc.start().unwrap();
        enc.write_object(&shared_graph()).unwrap();
        enc.finish().unwrap();
        let written = enc.counters().clone();
        let bytes = enc.into_inner();

        assert_eq!(written.new_objects, 2);
        assert_eq!(written.back_refs_near, 2);
        assert_eq!(written.bytes, bytes.len() as u64);

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), collab(&[])).unwrap();
        dec.start().unwrap();
        dec.read_object().unwrap();
        dec.finish().unwrap();
        let read = dec.counters();

        assert_eq!(read.new_objects, written.new_objects);
        assert_eq!(read.back_refs(), written.back_refs());
        assert_eq!(read.bytes, written.bytes);
    }

    struct Chatty;

    impl SerialHooks for Chatty {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.write_bytes(&[7u8; 40])
        }

        fn read_object(&self, input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            let mut buf = [0u8; 40];
            input.read_fully(&mut buf)
        }
    }

    #[test]
    fn test_snapshot_ratios() {
        init_logging();
        let ty = TypeDef::serializable("Chatty").hooks(Rc::new(Chatty)).build();
        let v = Value::object(Object::Instance(Instance::with_defaults(&ty)));

        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), collab(&[&ty])).unwrap();
        enc.start().unwrap();
        enc.write_object(&v).unwrap();
        enc.write_object(&v).unwrap();
        enc.finish().unwrap();

        let snap = enc.snapshot();
        assert_eq!(snap.version, MAX_VERSION);
        assert_eq!(snap.counters.block_bytes, 40);
        assert_eq!(snap.back_refs, 1);
        assert!((snap.sharing_ratio - 1.0).abs() < f64::EPSILON);
        assert!(snap.block_ratio > 0.0 && snap.block_ratio < 1.0);
        assert!(snap.sanity_check());
    }

    #[test]
    fn test_snapshot_json_keeps_counters() {
        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), collab(&[])).unwrap();
        enc.start().unwrap();
        enc.write_object(&shared_graph()).unwrap();
        enc.finish().unwrap();

        let snap = enc.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.counters, snap.counters);
        assert_eq!(back.version, snap.version);
        assert_eq!(back.elapsed, snap.elapsed);
    }

    #[test]
    fn test_empty_session_ratios_are_zero() {
        let counters = SessionCounters::default();
        let snap = SessionSnapshot::from(4, &counters, &SessionTimer::new());
        assert_eq!(snap.sharing_ratio, 0.0);
        assert_eq!(snap.block_ratio, 0.0);
        assert_eq!(snap.elapsed, Duration::ZERO);
        assert!(snap.sanity_check());
    }

    #[test]
    fn test_counters_merge() {
        let mut a = SessionCounters { new_objects: 3, back_refs_far: 1, drained_bytes: 5, ..Default::default() };
        let b = SessionCounters { new_objects: 2, back_refs_near: 4, cache_clears: 1, ..Default::default() };
        a += b;
        assert_eq!(a.new_objects, 5);
        assert_eq!(a.back_refs(), 5);
        assert_eq!(a.cache_clears, 1);
        assert_eq!(a.drained_bytes, 5);
    }

    #[test]
    fn test_timer_freezes_on_stop() {
        let mut t = SessionTimer::new();
        assert_eq!(t.elapsed(), Duration::ZERO);
        t.start();
        std::thread::sleep(Duration::from_millis(2));
        t.stop();
        let frozen = t.elapsed();
        assert!(frozen >= Duration::from_millis(2));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(t.elapsed(), frozen);
    }
}
