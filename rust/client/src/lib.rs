extern crate reqwest;
extern crate serde;
extern crate serde_json;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::ser::Serialize;
use serde_json::{to_value, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use value_extensions::*;

pub type Discrete = i32;
pub type Continous = f64;

pub type GymResult<T> = Result<T, GymError>;

#[derive(Debug, Error)]
pub enum GymError {
    #[error("http request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response shape: missing or invalid '{0}'")]
    Shape(String),

    #[error("unsupported space: {0}")]
    UnsupportedSpace(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObsActSpace {
    /// Refer: https://www.gymlibrary.dev/api/spaces/#discrete
    Discrete { n: Discrete },

    /// Refer: https://www.gymlibrary.dev/api/spaces/#box
    Box {
        shape: Vec<Discrete>,
        high: Vec<Continous>,
        low: Vec<Continous>,
    },
}

impl ObsActSpace {
    pub fn from_json(info: &Map<String, Value>) -> GymResult<Self> {
        let name = info
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GymError::Shape("name".into()))?;

        match name {
            "Discrete" => Ok(ObsActSpace::Discrete {
                n: info
                    .get("n")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| GymError::Shape("n".into()))? as Discrete,
            }),
            "Box" => Ok(ObsActSpace::Box {
                shape: as_discrete_item_vec(info, "shape")?,
                high: as_continous_item_vec(info, "high")?,
                low: as_continous_item_vec(info, "low")?,
            }),
            e => Err(GymError::UnsupportedSpace(e.to_string())),
        }
    }

    /// Number of scalar entries an item of this space flattens to.
    pub fn flat_len(&self) -> usize {
        match self {
            ObsActSpace::Discrete { .. } => 1,
            ObsActSpace::Box { shape, .. } => shape.iter().map(|&d| d.max(0) as usize).product(),
        }
    }

    /// Flat observation vector; only Box observations are understood.
    pub fn observation_from_json(&self, vals: &Value) -> GymResult<Vec<Continous>> {
        if let ObsActSpace::Discrete { .. } = self {
            return Err(GymError::UnsupportedSpace(format!(
                "observations from {self:?}"
            )));
        }

        vals.as_array()
            .ok_or_else(|| GymError::Shape("observation".into()))?
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| GymError::Shape("observation".into())))
            .collect()
    }

    /// Request value for `action`; only Discrete action spaces are understood.
    pub fn action_to_json(&self, action: Discrete) -> GymResult<Value> {
        match self {
            ObsActSpace::Discrete { n } if (0..*n).contains(&action) => Ok(to_value(action)?),
            ObsActSpace::Discrete { n } => Err(GymError::InvalidAction(format!(
                "expected an action in 0..{n}, got {action}"
            ))),
            ObsActSpace::Box { .. } => Err(GymError::UnsupportedSpace(format!(
                "actions in {self:?}"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct StepInfo {
    pub observation: Vec<Continous>,
    pub reward: f64,
    pub truncated: bool,
    pub terminated: bool,
}

/// Create a gymnasium environment on the server.
/// NOTE: All APIs are sync as the server is expected to be local.
#[derive(Debug)]
pub struct Environment {
    client: Client,
    api_url: String,
    obs_space: ObsActSpace,
    act_space: ObsActSpace,
}

impl Environment {
    /// `max_episode_steps: None` leaves the id's registered limit in place.
    pub fn new(
        api_url: &str,
        env_name: &str,
        max_episode_steps: Option<Discrete>,
        auto_reset: Option<bool>,
        disable_env_checker: Option<bool>,
    ) -> GymResult<Self> {
        let body = create_body(env_name, max_episode_steps, auto_reset, disable_env_checker)?;

        let client = Client::new(api_url)?;
        let obj = client.http_post(&client.make_api_url(""), &body)?;
        let instance_id = obj["instance_id"]
            .as_str()
            .ok_or_else(|| GymError::Shape("instance_id".into()))?;

        let obs_space = client.space(&format!("{instance_id}/observation_space/"))?;
        let act_space = client.space(&format!("{instance_id}/action_space/"))?;

        Ok(Self {
            api_url: client.make_api_url(&format!("{instance_id}/")),
            client,
            obs_space,
            act_space,
        })
    }

    pub fn name(&self) -> GymResult<String> {
        let obj = self.client.http_get(&self.api_url)?;

        obj["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GymError::Shape("id".into()))
    }

    /// The Space object corresponding to valid actions. If the action space is Discrete(2),
    /// there are two valid discrete actions: 0 & 1.
    /// Refer: https://gymnasium.farama.org/api/env/#gymnasium.Env.action_space
    pub fn action_space(&self) -> &ObsActSpace {
        &self.act_space
    }

    /// The Space object corresponding to valid observations. For a Box of shape (4,), a valid
    /// observation is an array of 4 numbers.
    /// Refer: https://gymnasium.farama.org/api/env/#gymnasium.Env.observation_space
    pub fn observation_space(&self) -> &ObsActSpace {
        &self.obs_space
    }

    pub fn reset(&self, seed: Option<u64>) -> GymResult<Vec<Continous>> {
        let mut body = HashMap::new();
        if let Some(seed) = seed {
            body.insert("seed", to_value(seed)?);
        }

        let obj = self.client.http_post(&self.make_api_url("reset/"), &body)?;
        self.obs_space.observation_from_json(&obj["observation"])
    }

    pub fn step(&self, action: Discrete) -> GymResult<StepInfo> {
        let req = HashMap::from([("action", self.act_space.action_to_json(action)?)]);
        let obj = self.client.http_post(&self.make_api_url("step/"), &req)?;

        Ok(StepInfo {
            observation: self.obs_space.observation_from_json(&obj["observation"])?,
            reward: as_field(&obj, "reward", Value::as_f64)?,
            truncated: as_field(&obj, "truncated", Value::as_bool)?,
            terminated: as_field(&obj, "terminated", Value::as_bool)?,
        })
    }

    pub fn close(&self) -> GymResult<()> {
        self.client
            .http_post(&self.make_api_url("close/"), &HashMap::<&str, Value>::new())?;
        Ok(())
    }

    fn make_api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }
}

fn create_body(
    env_name: &str,
    max_episode_steps: Option<Discrete>,
    auto_reset: Option<bool>,
    disable_env_checker: Option<bool>,
) -> GymResult<HashMap<&'static str, Value>> {
    let mut body = HashMap::from([("env_id", to_value(env_name)?)]);

    if let Some(max_episode_steps) = max_episode_steps {
        body.insert("max_episode_steps", to_value(max_episode_steps)?);
    }

    if let Some(auto_reset) = auto_reset {
        body.insert("auto_reset", to_value(auto_reset)?);
    }

    if let Some(disable_env_checker) = disable_env_checker {
        body.insert("disable_env_checker", to_value(disable_env_checker)?);
    }

    body.insert("kwargs", Value::Object(Map::new()));
    Ok(body)
}

#[derive(Debug)]
struct Client {
    api_url: String,
    client: reqwest::blocking::Client,
}

impl Client {
    fn new(base_url: &str) -> GymResult<Self> {
        let base_url = base_url
            .replace("//localhost:", "//127.0.0.1:")
            .trim_end_matches('/')
            .to_string();

        let api_url = format!("{base_url}/v1/envs/");
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|source| GymError::Http {
                url: base_url,
                source,
            })?;

        Ok(Self { api_url, client })
    }

    fn make_api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn space(&self, path: &str) -> GymResult<ObsActSpace> {
        let obj = self.http_get(&self.make_api_url(path))?;
        let info = obj["info"]
            .as_object()
            .ok_or_else(|| GymError::Shape("info".into()))?;
        ObsActSpace::from_json(info)
    }

    fn http_get(&self, url: &str) -> GymResult<Value> {
        self.client
            .get(url)
            .headers(Self::construct_common_headers())
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.json::<Value>())
            .map_err(|source| GymError::Http {
                url: url.to_string(),
                source,
            })
    }

    fn http_post<T: Serialize>(&self, url: &str, body: &HashMap<&str, T>) -> GymResult<Value> {
        self.client
            .post(url)
            .headers(Self::construct_common_headers())
            .json(body)
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.json::<Value>())
            .map_err(|source| GymError::Http {
                url: url.to_string(),
                source,
            })
    }

    fn construct_common_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

mod value_extensions {
    use super::*;

    pub fn as_field<T>(obj: &Value, key: &str, f: fn(&Value) -> Option<T>) -> GymResult<T> {
        f(&obj[key]).ok_or_else(|| GymError::Shape(key.to_string()))
    }

    pub fn as_discrete_item_vec(info: &Map<String, Value>, key: &str) -> GymResult<Vec<Discrete>> {
        info.get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| GymError::Shape(key.to_string()))?
            .iter()
            .map(|x| {
                x.as_i64()
                    .map(|x| x as Discrete)
                    .ok_or_else(|| GymError::Shape(key.to_string()))
            })
            .collect()
    }

    pub fn as_continous_item_vec(
        info: &Map<String, Value>,
        key: &str,
    ) -> GymResult<Vec<Continous>> {
        info.get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| GymError::Shape(key.to_string()))?
            .iter()
            .map(|x| x.as_f64().ok_or_else(|| GymError::Shape(key.to_string())))
            .collect()
    }
}
