// Hook scopes: segmenting, nested objects inside a scope, draining of data
// the reader ignores, and the end-of-scope conventions.

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use graphwire_core::prelude::*;

    fn field_i32(obj: &ObjectRef, name: &str) -> i32 {
        obj.borrow()
            .as_instance()
            .and_then(|i| i.field(name))
            .and_then(Value::as_i32)
            .unwrap_or_default()
    }

    fn set_field(obj: &ObjectRef, name: &str, v: Value) {
        if let Some(i) = obj.borrow_mut().as_instance_mut() {
            i.set_field(name, v);
        }
    }

    fn collab(types: &[&TypeRef]) -> Collaborators {
        let mut reg = TypeRegistry::new();
        for t in types {
            reg.register_hierarchy(t);
        }
        Collaborators::new(Rc::new(reg))
    }

    /// Writes three ints and a nested string; reads back only the first int.
    struct Lazy;

    impl SerialHooks for Lazy {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.write_int(1)?;
            out.write_int(2)?;
            out.write_int(3)?;
            out.write_object(&Value::str("inner"))
        }

        fn read_object(&self, input: &mut dyn ObjectInput, obj: &ObjectRef) -> Result<()> {
            let first = input.read_int()?;
            set_field(obj, "first", Value::Int(first));
            Ok(())
        }
    }

    fn lazy_type() -> TypeRef {
        TypeDef::serializable("Lazy")
            .prim("first", PrimitiveKind::Int)
            .hooks(Rc::new(Lazy))
            .build()
    }

    #[test]
    fn test_unread_scope_data_is_drained() {
        let ty = lazy_type();
        let c = collab(&[&ty]);
        let obj = ObjectRef::new(Object::Instance(Instance::with_defaults(&ty)));

        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object(&Value::Object(obj)).unwrap();
        enc.write_object(&Value::str("marker")).unwrap();
        enc.finish().unwrap();
        let bytes = enc.into_inner();

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), c).unwrap();
        dec.start().unwrap();
        let first = dec.read_object().unwrap();
        let marker = dec.read_object().unwrap();
        dec.finish().unwrap();

        assert_eq!(field_i32(first.as_object().unwrap(), "first"), 1);
        assert_eq!(marker.as_str(), Some("marker"));
        assert_eq!(dec.counters().drained_bytes, 8);
    }

    /// Declared fields first, then `n` trailing ints read until the scope ends.
    struct Trailing;

    impl SerialHooks for Trailing {
        fn write_object(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()> {
            let n = field_i32(obj, "n");
            out.default_write_fields()?;
            for i in 0..n {
                out.write_int(i)?;
            }
            Ok(())
        }

        fn read_object(&self, input: &mut dyn ObjectInput, obj: &ObjectRef) -> Result<()> {
            input.default_read_fields()?;
            let mut seen = 0;
            while !input.end_of_scope()? {
                input.read_int()?;
                seen += 1;
            }
            set_field(obj, "seen", Value::Int(seen));
            Ok(())
        }
    }

    fn trailing_type() -> TypeRef {
        TypeDef::serializable("Trailing")
            .prim("n", PrimitiveKind::Int)
            .prim("seen", PrimitiveKind::Int)
            .hooks(Rc::new(Trailing))
            .build()
    }

    fn trailing_roundtrip(block_size: usize, n: i32) -> (ObjectRef, SessionCounters) {
        let ty = trailing_type();
        let c = collab(&[&ty]);
        let obj = ObjectRef::new(Object::Instance(Instance::with_defaults(&ty).with("n", n)));
        let cfg = EngineConfig { block_size, ..EngineConfig::default() };

        let mut enc = Encoder::new(Vec::new(), cfg.clone(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object(&Value::Object(obj)).unwrap();
        enc.finish().unwrap();
        let counters = enc.counters().clone();

        let back = decode_from_slice(&enc.into_inner(), cfg, c).unwrap();
        (back.as_object().unwrap().clone(), counters)
    }

    #[test]
    fn test_end_of_scope_stops_at_the_marker() {
        let (back, counters) = trailing_roundtrip(8192, 5);
        assert_eq!(field_i32(&back, "n"), 5);
        assert_eq!(field_i32(&back, "seen"), 5);
        assert_eq!(counters.blocks, 1);
        assert_eq!(counters.block_bytes, 28);
    }

    #[test]
    fn test_tiny_block_size_flushes_every_write() {
        let (back, counters) = trailing_roundtrip(3, 10);
        assert_eq!(field_i32(&back, "seen"), 10);
        assert!(counters.blocks > 10);
    }

    #[test]
    fn test_no_trailing_values() {
        let (back, counters) = trailing_roundtrip(8192, 0);
        assert_eq!(field_i32(&back, "seen"), 0);
        assert_eq!(counters.blocks, 1);
    }

    /// Optional trailing value: absent in streams from older writers.
    struct Optional {
        write_extra: bool,
    }

    impl SerialHooks for Optional {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.write_int(10)?;
            if self.write_extra {
                out.write_int(20)?;
            }
            Ok(())
        }

        fn read_object(&self, input: &mut dyn ObjectInput, obj: &ObjectRef) -> Result<()> {
            let a = input.read_int()?;
            let b = match input.read_int() {
                Ok(v) => v,
                Err(e) if e.is_no_more_hook_data() => -1,
                Err(e) => return Err(e),
            };
            assert_eq!(input.remaining(), 0);
            set_field(obj, "a", Value::Int(a));
            set_field(obj, "b", Value::Int(b));
            Ok(())
        }
    }

    fn optional_type(write_extra: bool) -> TypeRef {
        TypeDef::serializable("Optional")
            .prim("a", PrimitiveKind::Int)
            .prim("b", PrimitiveKind::Int)
            .hooks(Rc::new(Optional { write_extra }))
            .build()
    }

    #[test]
    fn test_reading_past_the_scope_reports_no_more_hook_data() {
        let old = optional_type(false);
        let new = optional_type(true);

        let obj = ObjectRef::new(Object::Instance(Instance::with_defaults(&old)));
        let bytes = encode_to_vec(&Value::Object(obj), EngineConfig::default(), collab(&[&old])).unwrap();
        let back = decode_from_slice(&bytes, EngineConfig::default(), collab(&[&new])).unwrap();
        assert_eq!(field_i32(back.as_object().unwrap(), "a"), 10);
        assert_eq!(field_i32(back.as_object().unwrap(), "b"), -1);

        let obj = ObjectRef::new(Object::Instance(Instance::with_defaults(&new)));
        let bytes = encode_to_vec(&Value::Object(obj), EngineConfig::default(), collab(&[&new])).unwrap();
        let back = decode_from_slice(&bytes, EngineConfig::default(), collab(&[&new])).unwrap();
        assert_eq!(field_i32(back.as_object().unwrap(), "b"), 20);
    }

    /// Reads an object where the writer left primitive data.
    struct Confused;

    impl SerialHooks for Confused {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.write_int(1)
        }

        fn read_object(&self, input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            input.read_object().map(|_| ())
        }
    }

    #[test]
    fn test_object_read_over_unread_block_bytes_is_corrupt() {
        let ty = TypeDef::serializable("Confused").hooks(Rc::new(Confused)).build();
        let obj = ObjectRef::new(Object::Instance(Instance::with_defaults(&ty)));
        let bytes = encode_to_vec(&Value::Object(obj), EngineConfig::default(), collab(&[&ty])).unwrap();
        let err = decode_from_slice(&bytes, EngineConfig::default(), collab(&[&ty])).unwrap_err();
        assert!(matches!(err.root(), WireError::CorruptStream(_)), "{}", err);
    }

    #[test]
    fn test_hooked_objects_nest_inside_scopes() {
        let lazy = lazy_type();
        let holder = TypeDef::serializable("Holder").reference("inner").hooks(Rc::new(Nesting)).build();
        let c = collab(&[&lazy, &holder]);

        let inner = ObjectRef::new(Object::Instance(Instance::with_defaults(&lazy)));
        let outer = ObjectRef::new(Object::Instance(
            Instance::with_defaults(&holder).with("inner", Value::Object(inner)),
        ));
        let bytes = encode_to_vec(&Value::Object(outer), EngineConfig::default(), c.clone()).unwrap();
        let back = decode_from_slice(&bytes, EngineConfig::default(), c).unwrap();

        let inner = back
            .as_object()
            .unwrap()
            .borrow()
            .as_instance()
            .and_then(|i| i.field("inner").cloned())
            .unwrap();
        assert_eq!(field_i32(inner.as_object().unwrap(), "first"), 1);
    }

    /// Bracket the default fields with raw ints.
    struct Nesting;

    impl SerialHooks for Nesting {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.write_int(-7)?;
            out.default_write_fields()?;
            out.write_int(7)
        }

        fn read_object(&self, input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            assert_eq!(input.read_int()?, -7);
            input.default_read_fields()?;
            assert_eq!(input.read_int()?, 7);
            assert!(input.end_of_scope()?);
            Ok(())
        }
    }

    struct Silent;

    impl SerialHooks for Silent {
        fn write_object(&self, _out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            Ok(())
        }

        fn read_object(&self, input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            assert!(input.end_of_scope()?);
            Ok(())
        }
    }

    #[test]
    fn test_empty_hook_scope_is_only_the_end_marker() {
        let ty = TypeDef::serializable("Silent").hooks(Rc::new(Silent)).build();
        let obj = ObjectRef::new(Object::Instance(Instance::with_defaults(&ty)));
        let bytes = encode_to_vec(&Value::Object(obj), EngineConfig::default(), collab(&[&ty])).unwrap();
        assert_eq!(bytes.last(), Some(&Tag::EndBlockData.byte()));
        decode_from_slice(&bytes, EngineConfig::default(), collab(&[&ty])).unwrap();
    }

    struct BlobCodec;

    impl Externalizable for BlobCodec {
        fn write_external(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()> {
            out.write_int(field_i32(obj, "v"))
        }

        fn read_external(&self, input: &mut dyn ObjectInput, obj: &ObjectRef) -> Result<()> {
            let v = input.read_int()?;
            set_field(obj, "v", Value::Int(v));
            Ok(())
        }
    }

    #[test]
    fn test_primitive_read_spans_segment_boundary() {
        let ty = TypeDef::externalizable("Blob", Rc::new(BlobCodec))
            .prim("v", PrimitiveKind::Int)
            .build();
        #[rustfmt::skip]
        let bytes = vec![
            0x04,                                   // version
            0x05,                                   // NewObject
            0x0d, 0x00, 0x04, b'B', b'l', b'o', b'b', // ExternalizableClass "Blob"
            0, 0, 0, 0, 0, 0, 0, 0,                 // fingerprint
            0x1c, 0x02, 0x00, 0x00,                 // segment: high half
            0x1c, 0x02, 0x01, 0x02,                 // segment: low half
            0x1f,                                   // EndBlockData
        ];
        let back = decode_from_slice(&bytes, EngineConfig::default(), collab(&[&ty])).unwrap();
        assert_eq!(field_i32(back.as_object().unwrap(), "v"), 258);
    }
}
