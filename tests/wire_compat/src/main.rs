fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use vibelink_protocol::frame::{self, Decoded};
    use vibelink_protocol::handshake;
    use vibelink_protocol::{Response, SceneDump, ToolCommand};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON numbers so that `4` and `4.0` compare equal.
    ///
    /// The editor tools write whole floats without a fraction; serde writes
    /// `f32` fields with one.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    fn decode_hex(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }

    // --- Editor commands ---

    #[test]
    fn fixture_generate_house() {
        let cmd = roundtrip_test::<ToolCommand>("generate_house.json");
        assert_eq!(
            cmd,
            ToolCommand::house(2, 6, 8, 48213, "C:/Projects/Village/Assets/Generated")
        );
    }

    #[test]
    fn fixture_generate_nature_tree() {
        let cmd = roundtrip_test::<ToolCommand>("generate_nature_tree.json");
        assert_eq!(
            cmd,
            ToolCommand::tree(4.0, 901, "/home/dev/village/Assets/Generated")
        );
    }

    #[test]
    fn fixture_generate_nature_rock() {
        let cmd = roundtrip_test::<ToolCommand>("generate_nature_rock.json");
        assert_eq!(
            cmd,
            ToolCommand::rock(1.5, 77, "/home/dev/village/Assets/Generated")
        );
    }

    #[test]
    fn fixture_generate_humanoid() {
        let cmd = roundtrip_test::<ToolCommand>("generate_humanoid.json");
        assert_eq!(cmd.name(), "generate_humanoid");
    }

    // --- Relay payloads ---

    #[test]
    fn fixture_scene_dump() {
        let dump = roundtrip_test::<SceneDump>("scene_dump.json");
        assert_eq!(dump.objects.len(), 2);
        assert_eq!(dump.objects[1].parent_id, dump.objects[0].id);
    }

    #[test]
    fn fixture_responses() {
        let fixture = load_fixture("responses.json");
        let cases = [
            ("pong", Response::Pong),
            ("relayed", Response::Relayed),
            (
                "error",
                Response::Error("snapshot failed: scene is reloading".into()),
            ),
        ];
        for (name, response) in cases {
            let actual: serde_json::Value = serde_json::from_str(&response.to_json()).unwrap();
            assert_eq!(actual, fixture[name], "response {name}");
        }
    }

    // --- WebSocket layer ---

    #[test]
    fn fixture_handshake_accept_keys() {
        let fixture = load_fixture("handshake.json");
        for case in fixture.as_array().unwrap() {
            let key = case["key"].as_str().unwrap();
            let accept = case["accept"].as_str().unwrap();
            assert_eq!(handshake::accept_key(key), accept, "key {key}");
            handshake::verify_response(handshake::accept_response(key).as_bytes(), key).unwrap();
        }
    }

    #[test]
    fn fixture_frames() {
        let fixture = load_fixture("frames.json");
        for case in fixture.as_array().unwrap() {
            let name = case["name"].as_str().unwrap();
            let bytes = decode_hex(case["hex"].as_str().unwrap());

            let Decoded::Frame { frame, consumed } = frame::decode(&bytes, usize::MAX).unwrap()
            else {
                panic!("{name}: incomplete");
            };
            assert_eq!(consumed, bytes.len(), "{name}");
            assert_eq!(frame.is_masked(), case["masked"].as_bool().unwrap(), "{name}");

            let text = case["text"].as_str().unwrap();
            if frame.is_close() {
                assert!(text.is_empty(), "{name}");
                continue;
            }
            assert_eq!(frame.clone().into_text(), text, "{name}");

            if !frame.is_masked() {
                assert_eq!(frame::encode_text(text.as_bytes()), bytes, "{name}");
            } else if let Some(key) = frame.mask_key {
                assert_eq!(
                    frame::encode_masked_text(text.as_bytes(), key),
                    bytes,
                    "{name}"
                );
            }
        }
    }
}
