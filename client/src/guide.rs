//! Device integration snippets for a channel.
//!
//! Plain text templates that post readings to the gateway the same way
//! [`ApiClient::post_reading`](crate::ApiClient::post_reading) does.

use crate::model::Channel;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WRITE_INTERVAL_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Esp32,
    RaspberryPi,
    Python,
    Curl,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Esp32,
        Platform::RaspberryPi,
        Platform::Python,
        Platform::Curl,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Platform::Esp32 => "esp32",
            Platform::RaspberryPi => "raspberry",
            Platform::Python => "python",
            Platform::Curl => "curl",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Platform::Esp32 => "ESP32",
            Platform::RaspberryPi => "Raspberry Pi",
            Platform::Python => "Python",
            Platform::Curl => "curl/Bash",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| format!("unknown platform '{s}' (expected esp32, raspberry, python or curl)"))
    }
}

/// Everything a snippet is parameterized by.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideContext {
    pub base_url: String,
    pub api_key: String,
    /// Example payload, in the channel's field order.
    pub sample: Vec<(String, f64)>,
    pub write_interval_secs: u64,
}

impl GuideContext {
    pub fn new(base_url: &str, api_key: &str, channel: Option<&Channel>, rng: &mut impl Rng) -> Self {
        let fields = channel.map(|c| c.allowed_fields.as_slice()).unwrap_or_default();
        let write_interval_secs = channel
            .map(|c| c.min_write_interval_seconds)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_WRITE_INTERVAL_SECS);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            sample: sample_payload(fields, rng),
            write_interval_secs,
        }
    }

    fn readings_url(&self) -> String {
        format!("{}/api/readings", self.base_url)
    }

    fn field_names(&self) -> impl Iterator<Item = &str> {
        self.sample.iter().map(|(field, _)| field.as_str())
    }
}

/// Example values for `fields`, falling back to temperature and humidity.
pub fn sample_payload(fields: &[String], rng: &mut impl Rng) -> Vec<(String, f64)> {
    if fields.is_empty() {
        return vec![
            ("temperature".to_string(), 24.5),
            ("humidity".to_string(), 60.2),
        ];
    }

    fields
        .iter()
        .map(|field| {
            let value = match field.as_str() {
                "temperature" => 24.5,
                "humidity" => 60.2,
                _ => (rng.gen_range(0.0..100.0_f64) * 100.0).round() / 100.0,
            };
            (field.clone(), value)
        })
        .collect()
}

pub fn render(platform: Platform, ctx: &GuideContext) -> String {
    match platform {
        Platform::Esp32 => render_esp32(ctx),
        Platform::RaspberryPi => render_raspberry(ctx),
        Platform::Python => render_python(ctx),
        Platform::Curl => render_curl(ctx),
    }
}

fn render_esp32(ctx: &GuideContext) -> String {
    let reads = ctx
        .field_names()
        .map(|f| format!("float {f} = read{}();", capitalize(f)))
        .collect::<Vec<_>>()
        .join("\n    ");
    let args = ctx.field_names().collect::<Vec<_>>().join(", ");
    let params = ctx
        .field_names()
        .map(|f| format!("float {f}"))
        .collect::<Vec<_>>()
        .join(", ");
    let doc_sets = ctx
        .field_names()
        .map(|f| format!("doc[\"{f}\"] = {f};"))
        .collect::<Vec<_>>()
        .join("\n  ");

    format!(
        r#"// ESP32 Arduino Code
#include <WiFi.h>
#include <HTTPClient.h>
#include <ArduinoJson.h>

const char* ssid = "YOUR_WIFI_SSID";
const char* password = "YOUR_WIFI_PASSWORD";
const char* apiUrl = "{url}";
const char* apiKey = "{key}";

const unsigned long updateInterval = {interval_ms};
unsigned long lastUpdate = 0;

void setup() {{
  Serial.begin(115200);
  WiFi.begin(ssid, password);

  while (WiFi.status() != WL_CONNECTED) {{
    delay(500);
    Serial.print(".");
  }}
  Serial.println("\nWiFi connected!");
}}

void loop() {{
  if (millis() - lastUpdate >= updateInterval) {{
    lastUpdate = millis();

    // Read sensors
    {reads}

    sendData({args});
  }}
  delay(100);
}}

void sendData({params}) {{
  HTTPClient http;
  StaticJsonDocument<200> doc;
  {doc_sets}

  String json;
  serializeJson(doc, json);

  http.begin(apiUrl);
  http.addHeader("Content-Type", "application/json");
  http.addHeader("x-api-key", apiKey);

  int code = http.POST(json);
  Serial.print("Response: ");
  Serial.println(code);
  http.end();
}}
"#,
        url = ctx.readings_url(),
        key = ctx.api_key,
        interval_ms = ctx.write_interval_secs * 1000,
    )
}

fn render_raspberry(ctx: &GuideContext) -> String {
    let entries = ctx
        .sample
        .iter()
        .map(|(field, value)| format!("\"{field}\": {value}"))
        .collect::<Vec<_>>()
        .join(",\n        ");

    format!(
        r#"#!/usr/bin/env python3
# Raspberry Pi IoT Client

import requests
import time
import json

API_URL = "{url}"
API_KEY = "{key}"
INTERVAL = {interval}

def read_sensors():
    return {{
        {entries}
    }}

def send_data(data):
    headers = {{
        "x-api-key": API_KEY,
        "Content-Type": "application/json"
    }}
    try:
        r = requests.post(API_URL, json=data, headers=headers)
        if r.status_code == 202:
            print(f"Success: {{json.dumps(data)}}")
        else:
            print(f"Error {{r.status_code}}")
    except Exception as e:
        print(f"Error: {{e}}")

while True:
    data = read_sensors()
    send_data(data)
    time.sleep(INTERVAL)
"#,
        url = ctx.readings_url(),
        key = ctx.api_key,
        interval = ctx.write_interval_secs,
    )
}

fn render_python(ctx: &GuideContext) -> String {
    format!(
        r#"#!/usr/bin/env python3
import requests
import time

API_URL = "{url}"
API_KEY = "{key}"

data = {data}

headers = {{
    "x-api-key": API_KEY,
    "Content-Type": "application/json"
}}

response = requests.post(API_URL, json=data, headers=headers)
print(f"Status: {{response.status_code}}")
print(f"Response: {{response.text}}")
"#,
        url = ctx.readings_url(),
        key = ctx.api_key,
        data = json_object(&ctx.sample, true),
    )
}

fn render_curl(ctx: &GuideContext) -> String {
    format!(
        r#"# Post Reading
curl -X POST {url} \
  -H "x-api-key: {key}" \
  -H "Content-Type: application/json" \
  -d '{pretty}'

# Get Latest
curl -H "x-api-key: {key}" \
  {base}/api/readings/latest

# Bash Loop
while true; do
  curl -X POST {url} \
    -H "x-api-key: {key}" \
    -H "Content-Type: application/json" \
    -d '{compact}'
  sleep {interval}
done
"#,
        url = ctx.readings_url(),
        base = ctx.base_url,
        key = ctx.api_key,
        pretty = json_object(&ctx.sample, true),
        compact = json_object(&ctx.sample, false),
        interval = ctx.write_interval_secs,
    )
}

/// Renders ordered pairs as a JSON object, two-space indented when `pretty`.
fn json_object(pairs: &[(String, f64)], pretty: bool) -> String {
    let entries = pairs.iter().map(|(field, value)| {
        let key = serde_json::Value::String(field.clone());
        if pretty {
            format!("{key}: {value}")
        } else {
            format!("{key}:{value}")
        }
    });

    if pretty {
        format!("{{\n  {}\n}}", entries.collect::<Vec<_>>().join(",\n  "))
    } else {
        format!("{{{}}}", entries.collect::<Vec<_>>().join(","))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
