// Failure modes and the collaborator seams that can trigger them.

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

    fn decode(bytes: &[u8]) -> Result<Value> {
        decode_from_slice(bytes, EngineConfig::default(), collab(&[]))
    }

    fn ints(v: Vec<i32>) -> Value {
        Value::object(Object::Array(ArrayValue::Int(v)))
    }

    #[test]
    fn test_version_byte_is_checked() {
        assert!(matches!(decode(&[9, 0x01]).unwrap_err(), WireError::CorruptStream(_)));
        assert!(matches!(decode(&[1, 0x01]).unwrap_err(), WireError::CorruptStream(_)));
        assert!(matches!(decode(&[]).unwrap_err(), WireError::CorruptStream(_)));

        let v4 = encode_to_vec(&Value::str("new"), EngineConfig::with_version(4), collab(&[])).unwrap();
        let err = decode_from_slice(&v4, EngineConfig::with_version(3), collab(&[])).unwrap_err();
        assert!(matches!(err, WireError::CorruptStream(_)));

        // older streams stay readable
        let v2 = encode_to_vec(&Value::str("old"), EngineConfig::with_version(2), collab(&[])).unwrap();
        assert_eq!(decode(&v2).unwrap().as_str(), Some("old"));
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let bytes = encode_to_vec(&Value::str("hello"), EngineConfig::default(), collab(&[])).unwrap();
        let err = decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err.root(), WireError::CorruptStream(_)));
    }

    #[test]
    fn test_unknown_tag_is_corrupt() {
        assert!(matches!(decode(&[4, 0x00]).unwrap_err().root(), WireError::CorruptStream(_)));
        assert!(matches!(decode(&[4, 0x7f]).unwrap_err().root(), WireError::CorruptStream(_)));
    }

    #[test]
    fn test_dangling_back_reference() {
        let err = decode(&[4, Tag::RepeatObjectNear.byte(), 0xff]).unwrap_err();
        assert!(matches!(err.root(), WireError::InvalidBackReference { .. }));
    }

    #[test]
    fn test_errors_carry_the_field_path() {
        let widget = TypeDef::plain("Widget");
        let holder = TypeDef::serializable("Holder").reference("items").build();
        let v = Value::object(Object::Instance(
            Instance::with_defaults(&holder).with("items", Value::object(Object::Instance(Instance::new(&widget)))),
        ));
        let err = encode_to_vec(&v, EngineConfig::default(), collab(&[&holder])).unwrap_err();
        assert!(matches!(err.root(), WireError::NotEncodable(_)));
        assert!(err.trail().contains(&"field Holder.items"), "{:?}", err.trail());
        assert!(err.to_string().contains("Widget"));
    }

    #[test]
    fn test_shared_and_unshared_must_agree() {
        let c = collab(&[]);

        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object_unshared(&ints(vec![1])).unwrap();
        enc.write_object(&ints(vec![2])).unwrap();
        enc.finish().unwrap();
        let bytes = enc.into_inner();

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), c.clone()).unwrap();
        dec.start().unwrap();
        let err = dec.read_object().unwrap_err();
        assert!(matches!(err.root(), WireError::SharedUnsharedMismatch(_)));

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), c.clone()).unwrap();
        dec.start().unwrap();
        assert!(dec.read_object_unshared().is_ok());
        let err = dec.read_object_unshared().unwrap_err();
        assert!(matches!(err.root(), WireError::SharedUnsharedMismatch(_)));
    }

    #[test]
    fn test_back_reference_where_unshared_expected() {
        let s = Value::str("twice");
        let c = collab(&[]);
        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object(&s).unwrap();
        enc.write_object(&s).unwrap();
        enc.finish().unwrap();
        let bytes = enc.into_inner();

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), c).unwrap();
        dec.start().unwrap();
        dec.read_object().unwrap();
        let err = dec.read_object_unshared().unwrap_err();
        assert!(matches!(err.root(), WireError::SharedUnsharedMismatch(_)));
    }

    #[test]
    fn test_instance_cache_clear_between_writes() {
        let s = Value::str("again");
        let c = collab(&[]);
        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object(&s).unwrap();
        enc.clear_instance_cache().unwrap();
        enc.write_object(&s).unwrap();
        enc.finish().unwrap();
        assert_eq!(enc.counters().cache_clears, 1);
        assert_eq!(enc.counters().new_objects, 2);
        assert_eq!(enc.counters().back_refs(), 0);
        let bytes = enc.into_inner();

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), c).unwrap();
        dec.start().unwrap();
        let a = dec.read_object().unwrap();
        let b = dec.read_object().unwrap();
        dec.finish().unwrap();
        assert_eq!(dec.counters().cache_clears, 1);
        assert_eq!(a.as_str(), Some("again"));
        assert_eq!(b.as_str(), Some("again"));
        assert!(!a.same(&b));
    }

    #[test]
    fn test_type_cache_clear_between_writes() {
        let ty = TypeDef::serializable("Unit").prim("n", PrimitiveKind::Int).build();
        let c = collab(&[&ty]);
        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), c.clone()).unwrap();
        enc.start().unwrap();
        enc.write_object(&Value::object(Object::Instance(Instance::with_defaults(&ty).with("n", 1)))).unwrap();
        enc.clear_type_cache().unwrap();
        enc.write_object(&Value::object(Object::Instance(Instance::with_defaults(&ty).with("n", 2)))).unwrap();
        enc.finish().unwrap();
        assert_eq!(enc.counters().new_descriptors, 2);
        assert_eq!(enc.counters().descriptor_back_refs, 0);
        let bytes = enc.into_inner();

        let mut dec = Decoder::new(bytes.as_slice(), EngineConfig::default(), c).unwrap();
        dec.start().unwrap();
        let first = dec.read_object().unwrap();
        let second = dec.read_object().unwrap();
        dec.finish().unwrap();
        let n = |v: &Value| v.as_object().unwrap().borrow().as_instance().unwrap().field("n").unwrap().as_i32();
        assert_eq!(n(&first), Some(1));
        assert_eq!(n(&second), Some(2));
    }

    /// Encodes an amount as cents plus currency code.
    struct MoneyCodec;

    impl Externalizer for MoneyCodec {
        fn write_external(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()> {
            let (cents, currency) = {
                let o = obj.borrow();
                let inst = o.as_instance().ok_or_else(|| WireError::Hook("money is not an instance".into()))?;
                let cents = inst.field("cents").and_then(|v| v.as_i64()).unwrap_or_default();
                let currency = inst.field("currency").and_then(|v| v.as_str().map(String::from)).unwrap_or_default();
                (cents, currency)
            };
            out.write_long(cents)?;
            out.write_utf(&currency)
        }

        fn create_external(&self, ty: &TypeRef, input: &mut dyn ObjectInput) -> Result<ObjectRef> {
            let cents = input.read_long()?;
            let currency = input.read_utf()?;
            Ok(ObjectRef::new(Object::Instance(
                Instance::new(ty).with("cents", cents).with("currency", currency.as_str()),
            )))
        }
    }

    fn money_type() -> TypeRef {
        TypeDef::externalized("Money", Rc::new(MoneyCodec))
            .prim("cents", PrimitiveKind::Long)
            .field(FieldDef::string("currency"))
            .build()
    }

    #[test]
    fn test_externalizer_roundtrip_keeps_identity() {
        let ty = money_type();
        let c = collab(&[&ty]);
        let m = Value::object(Object::Instance(Instance::new(&ty).with("cents", 1999i64).with("currency", "EUR")));
        let root = Value::object(Object::Array(ArrayValue::Object {
            component: ComponentType::Any,
            elements: vec![m.clone(), m],
        }));
        let bytes = encode_to_vec(&root, EngineConfig::default(), c.clone()).unwrap();
        let back = decode_from_slice(&bytes, EngineConfig::default(), c).unwrap();
        assert!(back.deep_eq(&root));
    }

    /// Writes a reference to the object it is encoding.
    struct SelfRef;

    impl Externalizer for SelfRef {
        fn write_external(&self, out: &mut dyn ObjectOutput, obj: &ObjectRef) -> Result<()> {
            out.write_object(&Value::Object(obj.clone()))
        }

        fn create_external(&self, ty: &TypeRef, input: &mut dyn ObjectInput) -> Result<ObjectRef> {
            input.read_object()?;
            Ok(ObjectRef::new(Object::Instance(Instance::new(ty))))
        }
    }

    #[test]
    fn test_externalizer_cannot_read_itself_before_creation() {
        let ty = TypeDef::externalized("Ouroboros", Rc::new(SelfRef)).build();
        let c = collab(&[&ty]);
        let v = Value::object(Object::Instance(Instance::new(&ty)));
        let bytes = encode_to_vec(&v, EngineConfig::default(), c.clone()).unwrap();
        let err = decode_from_slice(&bytes, EngineConfig::default(), c).unwrap_err();
        assert!(matches!(
            err.root(),
            WireError::InvalidBackReference { reason: "instance still under construction", .. }
        ));
    }

    /// Rewrites one string value to another.
    struct Rename(&'static str, &'static str);

    impl ObjectSubstitution for Rename {
        fn before_write(&self, v: &Value) -> Result<Value> {
            Ok(if v.as_str() == Some(self.0) { Value::str(self.1) } else { v.clone() })
        }

        fn after_read(&self, v: Value) -> Result<Value> {
            Ok(if v.as_str() == Some(self.0) { Value::str(self.1) } else { v })
        }
    }

    #[test]
    fn test_substitution_on_both_sides_preserves_sharing() {
        let old = Value::str("old");
        let root = Value::object(Object::Array(ArrayValue::Object {
            component: ComponentType::Any,
            elements: vec![old.clone(), old],
        }));
        let bytes = encode_to_vec(&root, EngineConfig::default(), collab(&[]).with_substitution(Rc::new(Rename("old", "new"))))
            .unwrap();
        let back = decode_from_slice(&bytes, EngineConfig::default(), collab(&[]).with_substitution(Rc::new(Rename("new", "NEW"))))
            .unwrap();

        let obj = back.as_object().unwrap().borrow();
        let Object::Array(ArrayValue::Object { elements, .. }) = &*obj else {
            panic!("expected an object array");
        };
        assert_eq!(elements[0].as_str(), Some("NEW"));
        assert!(elements[0].same(&elements[1]));
    }

    #[test]
    fn test_engines_require_start() {
        let mut enc = Encoder::new(Vec::new(), EngineConfig::default(), collab(&[])).unwrap();
        assert!(matches!(enc.write_object(&Value::Null).unwrap_err(), WireError::Hook(_)));
        assert!(enc.finish().is_err());

        let bytes = [4u8, 0x01];
        let mut dec = Decoder::new(&bytes[..], EngineConfig::default(), collab(&[])).unwrap();
        assert!(matches!(dec.read_object().unwrap_err(), WireError::Hook(_)));
        dec.start().unwrap();
        assert!(dec.read_object().unwrap().is_null());
        dec.finish().unwrap();
    }

    /// Refuses to build anything.
    struct Sealed;

    impl Instantiator for Sealed {
        fn new_instance(&self, ty: &TypeRef) -> Result<ObjectRef> {
            Err(WireError::Hook(format!("{} is sealed", ty.name())))
        }
    }

    #[test]
    fn test_instantiator_failure_propagates() {
        let ty = TypeDef::serializable("Vault").prim("n", PrimitiveKind::Int).build();
        let v = Value::object(Object::Instance(Instance::with_defaults(&ty)));
        let bytes = encode_to_vec(&v, EngineConfig::default(), collab(&[&ty])).unwrap();
        let c = collab(&[&ty]).with_instantiator(Rc::new(Sealed));
        let err = decode_from_slice(&bytes, EngineConfig::default(), c).unwrap_err();
        assert!(matches!(err.root(), WireError::Hook(m) if m == "Vault is sealed"));
    }
}
