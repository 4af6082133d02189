//! Descriptor parsing shared by the code buffer and the verification tools

/// Split a method descriptor into parameter descriptors and the return
/// descriptor. `None` if the descriptor is malformed.
pub fn split_method_descriptor(desc: &str) -> Option<(Vec<&str>, &str)> {
    let rest = desc.strip_prefix('(')?;
    let close = rest.find(')')?;
    let (params, ret) = (&rest[..close], &rest[close + 1..]);
    let mut out = Vec::new();
    let mut i = 0;
    while i < params.len() {
        let len = field_descriptor_len(&params[i..])?;
        out.push(&params[i..i + len]);
        i += len;
    }
    if ret != "V" && field_descriptor_len(ret)? != ret.len() {
        return None;
    }
    Some((out, ret))
}

/// Length of the first field descriptor in `s`
fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(i + 1),
        b'L' => Some(i + s[i..].find(';')? + 1),
        _ => None,
    }
}

/// Slots a value of this field descriptor occupies (`V` is zero)
pub fn descriptor_slots(desc: &str) -> u16 {
    match desc {
        "V" => 0,
        "J" | "D" => 2,
        _ => 1,
    }
}

/// Slots of all parameters of a method descriptor
pub fn argument_slots(desc: &str) -> Option<u16> {
    let (params, _) = split_method_descriptor(desc)?;
    Some(params.iter().map(|p| descriptor_slots(p)).sum())
}

pub fn return_slots(desc: &str) -> Option<u16> {
    let (_, ret) = split_method_descriptor(desc)?;
    Some(descriptor_slots(ret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_parameters() {
        let (params, ret) = split_method_descriptor("(I[JLjava/lang/Object;D)Z").unwrap();
        assert_eq!(params, vec!["I", "[J", "Ljava/lang/Object;", "D"]);
        assert_eq!(ret, "Z");
        assert_eq!(argument_slots("(I[JLjava/lang/Object;D)Z"), Some(5));
        assert_eq!(return_slots("()J"), Some(2));
        assert_eq!(return_slots("()V"), Some(0));
    }

    #[test]
    fn rejects_malformed() {
        assert!(split_method_descriptor("I)V").is_none());
        assert!(split_method_descriptor("(Q)V").is_none());
        assert!(split_method_descriptor("(Ljava/lang/Object)V").is_none());
    }
}
