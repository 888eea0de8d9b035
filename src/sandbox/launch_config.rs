//! The YAML document fed to `lxc launch` on stdin.
//!
//! It seeds the operator's account through cloud-init (same name and uid, so
//! the shared `/home` is owned correctly) and bind-mounts the host's `/home`
//! with id shifting.

use serde_yaml::{Mapping, Value};

use crate::user::UserInfo;

fn mapping<const N: usize>(entries: [(&str, Value); N]) -> Value {
    let mut map = Mapping::new();
    for (key, value) in entries {
        map.insert(key.into(), value);
    }
    Value::Mapping(map)
}

/// `#cloud-config` user-data creating the operator's account.
pub fn cloud_config(user: &UserInfo) -> Result<String, serde_yaml::Error> {
    let entry = mapping([
        ("name", user.name.as_str().into()),
        ("uid", user.uid.into()),
        ("shell", "/bin/bash".into()),
        ("sudo", "ALL=(ALL) NOPASSWD:ALL".into()),
        ("no_create_home", true.into()),
    ]);
    let doc = mapping([("users", Value::Sequence(vec![entry]))]);
    Ok(format!("#cloud-config\n{}", serde_yaml::to_string(&doc)?))
}

pub fn launch_config(user: &UserInfo) -> Result<String, serde_yaml::Error> {
    let home = mapping([
        ("path", "/home".into()),
        // LXD device options are strings.
        ("shift", "true".into()),
        ("source", "/home".into()),
        ("type", "disk".into()),
    ]);
    let doc = mapping([
        (
            "config",
            mapping([("user.user-data", cloud_config(user)?.into())]),
        ),
        ("devices", mapping([("home", home)])),
    ]);
    serde_yaml::to_string(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserInfo {
        UserInfo {
            name: "alice".to_string(),
            uid: 1000,
            gid: 1000,
        }
    }

    #[test]
    fn home_device_is_shifted_disk() {
        let yaml = launch_config(&alice()).unwrap();
        let doc: Value = serde_yaml::from_str(&yaml).unwrap();
        let home = &doc["devices"]["home"];
        assert_eq!(home["path"], Value::from("/home"));
        assert_eq!(home["source"], Value::from("/home"));
        assert_eq!(home["type"], Value::from("disk"));
        // Must stay a string, not a YAML bool.
        assert_eq!(home["shift"], Value::from("true"));
    }

    #[test]
    fn user_data_seeds_operator() {
        let yaml = launch_config(&alice()).unwrap();
        let doc: Value = serde_yaml::from_str(&yaml).unwrap();
        let user_data = doc["config"]["user.user-data"].as_str().unwrap();
        assert!(user_data.starts_with("#cloud-config\n"), "{user_data}");

        let cloud: Value = serde_yaml::from_str(user_data).unwrap();
        let user = &cloud["users"][0];
        assert_eq!(user["name"], Value::from("alice"));
        assert_eq!(user["uid"], Value::from(1000));
        assert_eq!(user["shell"], Value::from("/bin/bash"));
        assert_eq!(user["sudo"], Value::from("ALL=(ALL) NOPASSWD:ALL"));
        assert_eq!(user["no_create_home"], Value::from(true));
    }
}
