// Type evolution between writer and reader: field matching, hierarchy gaps,
// unresolvable types and the per-version descriptor caches.

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use graphwire_core::prelude::*;

    fn collab(types: &[&TypeRef]) -> Collaborators {
        let mut reg = TypeRegistry::new();
        for t in types {
            reg.register_hierarchy(t);
        }
        Collaborators::new(Rc::new(reg))
    }

    fn field(v: &Value, name: &str) -> Option<Value> {
        v.as_object()?.borrow().as_instance()?.field(name).cloned()
    }

    fn set_field(obj: &ObjectRef, name: &str, v: Value) {
        if let Some(i) = obj.borrow_mut().as_instance_mut() {
            i.set_field(name, v);
        }
    }

    fn instance(ty: &TypeRef) -> Instance {
        Instance::with_defaults(ty)
    }

    fn write(v: &Value, writer: &[&TypeRef]) -> Vec<u8> {
        encode_to_vec(v, EngineConfig::default(), collab(writer)).unwrap()
    }

    fn elements(v: &Value) -> Vec<Value> {
        match &*v.as_object().unwrap().borrow() {
            Object::Array(ArrayValue::Object { elements, .. }) => elements.clone(),
            _ => panic!("expected an object array"),
        }
    }

    fn any_array(elements: Vec<Value>) -> Value {
        Value::object(Object::Array(ArrayValue::Object { component: ComponentType::Any, elements }))
    }

    #[test]
    fn test_extra_stream_fields_are_discarded_and_missing_ones_defaulted() {
        let writer = TypeDef::serializable("Point")
            .prim("x", PrimitiveKind::Int)
            .prim("y", PrimitiveKind::Int)
            .field(FieldDef::string("label"))
            .build();
        let reader = TypeDef::serializable("Point")
            .prim("x", PrimitiveKind::Int)
            .prim("z", PrimitiveKind::Long)
            .build();

        let v = Value::object(Object::Instance(instance(&writer).with("x", 3).with("y", 4).with("label", "p")));
        let back = decode_from_slice(&write(&v, &[&writer]), EngineConfig::default(), collab(&[&reader])).unwrap();

        assert_eq!(field(&back, "x").and_then(|v| v.as_i32()), Some(3));
        assert_eq!(field(&back, "z").and_then(|v| v.as_i64()), Some(0));
        assert!(field(&back, "y").is_none());
    }

    #[test]
    fn test_changed_field_kind_is_discarded() {
        let writer = TypeDef::serializable("Cell").prim("x", PrimitiveKind::Int).build();
        let reader = TypeDef::serializable("Cell").prim("x", PrimitiveKind::Long).build();
        let v = Value::object(Object::Instance(instance(&writer).with("x", 7)));
        let back = decode_from_slice(&write(&v, &[&writer]), EngineConfig::default(), collab(&[&reader])).unwrap();
        assert_eq!(field(&back, "x").and_then(|v| v.as_i64()), Some(0));
    }

    #[test]
    fn test_fingerprint_mismatch_is_tolerated() {
        let writer = TypeDef::serializable("Tag").prim("n", PrimitiveKind::Int).fingerprint(1).build();
        let reader = TypeDef::serializable("Tag").prim("n", PrimitiveKind::Int).fingerprint(2).build();
        let v = Value::object(Object::Instance(instance(&writer).with("n", 11)));
        let back = decode_from_slice(&write(&v, &[&writer]), EngineConfig::default(), collab(&[&reader])).unwrap();
        assert_eq!(field(&back, "n").and_then(|v| v.as_i32()), Some(11));
    }

    /// Marks the level as present-without-data.
    struct NoData;

    impl SerialHooks for NoData {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.default_write_fields()
        }

        fn read_object(&self, input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            input.default_read_fields()
        }

        fn read_object_no_data(&self, obj: &ObjectRef) -> Result<()> {
            set_field(obj, "b", Value::Int(42));
            Ok(())
        }
    }

    #[test]
    fn test_local_level_missing_from_stream_is_a_gap() {
        let a_w = TypeDef::serializable("A").prim("a", PrimitiveKind::Int).build();
        let c_w = TypeDef::serializable("C").extends(&a_w).prim("c", PrimitiveKind::Int).build();

        let a_r = TypeDef::serializable("A").prim("a", PrimitiveKind::Int).build();
        let b_r = TypeDef::serializable("B")
            .extends(&a_r)
            .prim("b", PrimitiveKind::Int)
            .hooks(Rc::new(NoData))
            .build();
        let c_r = TypeDef::serializable("C").extends(&b_r).prim("c", PrimitiveKind::Int).build();

        let v = Value::object(Object::Instance(instance(&c_w).with("a", 1).with("c", 3)));
        let back = decode_from_slice(&write(&v, &[&c_w]), EngineConfig::default(), collab(&[&c_r])).unwrap();

        assert_eq!(field(&back, "a").and_then(|v| v.as_i32()), Some(1));
        assert_eq!(field(&back, "b").and_then(|v| v.as_i32()), Some(42));
        assert_eq!(field(&back, "c").and_then(|v| v.as_i32()), Some(3));
    }

    #[test]
    fn test_stream_level_missing_locally_is_skipped() {
        let a_w = TypeDef::serializable("A").prim("a", PrimitiveKind::Int).build();
        let b_w = TypeDef::serializable("B")
            .extends(&a_w)
            .field(FieldDef::string("note"))
            .prim("b", PrimitiveKind::Long)
            .hooks(Rc::new(NoData))
            .build();
        let c_w = TypeDef::serializable("C").extends(&b_w).prim("c", PrimitiveKind::Int).build();

        let a_r = TypeDef::serializable("A").prim("a", PrimitiveKind::Int).build();
        let c_r = TypeDef::serializable("C").extends(&a_r).prim("c", PrimitiveKind::Int).build();

        let note = Value::str("dropped level");
        let v = Value::object(Object::Instance(
            instance(&c_w).with("a", 1).with("note", note.clone()).with("b", 2i64).with("c", 3),
        ));
        // the string inside the skipped level is still addressable afterwards
        let root = any_array(vec![v, note]);
        let back = decode_from_slice(&write(&root, &[&c_w]), EngineConfig::default(), collab(&[&c_r])).unwrap();

        let items = elements(&back);
        assert_eq!(field(&items[0], "a").and_then(|v| v.as_i32()), Some(1));
        assert_eq!(field(&items[0], "c").and_then(|v| v.as_i32()), Some(3));
        assert_eq!(items[1].as_str(), Some("dropped level"));
    }

    #[test]
    fn test_self_referential_type_metadata() {
        let node = TypeDef::serializable("Node")
            .prim("value", PrimitiveKind::Int)
            .field(FieldDef::typed("next", "Node"))
            .build();
        let c = collab(&[&node]);
        let v = Value::object(Object::Instance(instance(&node).with("value", 5)));

        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object(&v).unwrap();
        enc.finish().unwrap();
        assert_eq!(enc.counters().new_descriptors, 1);
        assert_eq!(enc.counters().descriptor_back_refs, 1);

        let back = decode_from_slice(&enc.into_inner(), EngineConfig::default(), c).unwrap();
        assert!(back.deep_eq(&v));
    }

    #[test]
    fn test_declared_type_unknown_to_the_writer_resolver_falls_back_to_object() {
        let holder = TypeDef::serializable("Holder").field(FieldDef::typed("gadget", "Gadget")).build();
        let v = Value::object(Object::Instance(instance(&holder).with("gadget", "not really a gadget")));
        let back = decode_from_slice(&write(&v, &[&holder]), EngineConfig::default(), collab(&[&holder])).unwrap();
        assert_eq!(field(&back, "gadget").and_then(|v| v.as_str().map(String::from)), Some("not really a gadget".into()));
    }

    struct Legacy;

    impl SerialHooks for Legacy {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.write_long(99)?;
            out.write_object(&Value::str("legacy payload"))?;
            out.write_utf("tail")
        }

        fn read_object(&self, _input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            Ok(())
        }
    }

    fn unresolvable_stream() -> (Vec<u8>, Value) {
        let secret = TypeDef::serializable("Secret")
            .prim("v", PrimitiveKind::Int)
            .field(FieldDef::string("s"))
            .build();
        let legacy = TypeDef::serializable("Legacy").hooks(Rc::new(Legacy)).build();
        let inner = Value::str("kept");
        let s = Value::object(Object::Instance(instance(&secret).with("v", 1).with("s", inner.clone())));
        let l = Value::object(Object::Instance(instance(&legacy)));
        let root = any_array(vec![s.clone(), l, s, inner, Value::str("after")]);
        (write(&root, &[&secret, &legacy]), root)
    }

    #[test]
    fn test_unresolvable_types_fail_by_default() {
        let (bytes, _) = unresolvable_stream();
        let err = decode_from_slice(&bytes, EngineConfig::default(), collab(&[])).unwrap_err();
        assert!(matches!(err.root(), WireError::UnresolvableType { name } if name == "Secret"), "{}", err);
    }

    #[test]
    fn test_unresolvable_types_can_be_skipped() {
        let (bytes, _) = unresolvable_stream();
        let cfg = EngineConfig { skip_unresolvable: true, ..EngineConfig::default() };

        let mut dec = Decoder::new(bytes.as_slice(), cfg, collab(&[])).unwrap();
        dec.start().unwrap();
        let back = dec.read_object().unwrap();
        dec.finish().unwrap();

        let items = elements(&back);
        assert!(items[0].is_null());
        assert!(items[1].is_null());
        assert!(items[2].is_null());
        assert_eq!(items[3].as_str(), Some("kept"));
        assert_eq!(items[4].as_str(), Some("after"));
        assert!(dec.counters().drained_bytes > 0);
    }

    #[test]
    fn test_variant_mismatch_makes_the_type_unresolvable() {
        let writer = TypeDef::serializable("Thing").prim("n", PrimitiveKind::Int).build();
        let reader = TypeDef::enumeration("Thing", &["ONE"]);
        let v = Value::object(Object::Instance(instance(&writer)));
        let err = decode_from_slice(&write(&v, &[&writer]), EngineConfig::default(), collab(&[&reader])).unwrap_err();
        assert!(matches!(err.root(), WireError::UnresolvableType { .. }));
    }

    struct Extended;

    impl SerialHooks for Extended {
        fn write_object(&self, out: &mut dyn ObjectOutput, _obj: &ObjectRef) -> Result<()> {
            out.default_write_fields()?;
            out.write_int(123)
        }

        fn read_object(&self, input: &mut dyn ObjectInput, _obj: &ObjectRef) -> Result<()> {
            input.default_read_fields()?;
            input.read_int().map(|_| ())
        }
    }

    #[test]
    fn test_hooked_stream_level_read_without_local_hooks() {
        let writer = TypeDef::serializable("Evolving")
            .prim("x", PrimitiveKind::Int)
            .hooks(Rc::new(Extended))
            .build();
        let reader = TypeDef::serializable("Evolving").prim("x", PrimitiveKind::Int).build();
        let v = Value::object(Object::Instance(instance(&writer).with("x", 8)));
        let root = any_array(vec![v, Value::str("next")]);
        let back = decode_from_slice(&write(&root, &[&writer]), EngineConfig::default(), collab(&[&reader])).unwrap();
        let items = elements(&back);
        assert_eq!(field(&items[0], "x").and_then(|v| v.as_i32()), Some(8));
        assert_eq!(items[1].as_str(), Some("next"));
    }

    #[test]
    fn test_version_four_splits_the_type_cache() {
        let node = TypeDef::serializable("Leaf").prim("n", PrimitiveKind::Int).fingerprint(0x0101).build();
        let color = TypeDef::enumeration("Color", &["RED", "GREEN"]);
        let c = collab(&[&node, &color]);
        let root = any_array(vec![
            Value::Object(color.enum_constant("RED").unwrap()),
            Value::object(Object::Instance(instance(&node).with("n", 1))),
            Value::Object(color.enum_constant("GREEN").unwrap()),
            Value::object(Object::Instance(instance(&node).with("n", 2))),
        ]);

        let v4 = encode_to_vec(&root, EngineConfig::with_version(4), c.clone()).unwrap();
        let v3 = encode_to_vec(&root, EngineConfig::with_version(3), c.clone()).unwrap();
        let serial_repeat = [Tag::RepeatSerialClassNear.byte(), 0xff];
        assert!(v4.windows(2).any(|w| w == serial_repeat));
        assert!(!v3.windows(2).any(|w| w == serial_repeat));

        for bytes in [v4, v3] {
            let back = decode_from_slice(&bytes, EngineConfig::default(), c.clone()).unwrap();
            assert!(back.deep_eq(&root));
        }
    }

    fn unknown_constant_stream() -> (Vec<u8>, TypeRef) {
        let writer = TypeDef::enumeration("Color", &["RED", "GREEN", "BLUE"]);
        let reader = TypeDef::enumeration("Color", &["RED", "GREEN"]);
        let blue = Value::Object(writer.enum_constant("BLUE").unwrap());
        let root = any_array(vec![
            Value::Object(writer.enum_constant("RED").unwrap()),
            blue.clone(),
            blue,
            Value::str("tail"),
        ]);
        (write(&root, &[&writer]), reader)
    }

    #[test]
    fn test_unknown_enum_constant_fails_by_default() {
        let (bytes, reader) = unknown_constant_stream();
        let err = decode_from_slice(&bytes, EngineConfig::default(), collab(&[&reader])).unwrap_err();
        assert!(matches!(err.root(), WireError::UnresolvableType { name } if name == "Color.BLUE"));
    }

    #[test]
    fn test_unknown_enum_constant_is_skipped_like_an_unknown_type() {
        let (bytes, reader) = unknown_constant_stream();
        let cfg = EngineConfig { skip_unresolvable: true, ..EngineConfig::default() };
        let back = decode_from_slice(&bytes, cfg, collab(&[&reader])).unwrap();

        let items = elements(&back);
        assert!(items[0].same(&Value::Object(reader.enum_constant("RED").unwrap())));
        assert!(items[1].is_null());
        assert!(items[2].is_null());
        assert_eq!(items[3].as_str(), Some("tail"));
    }
}
