//! Conversation state for the two chat front ends.
//!
//! - [`StudentSession`]: a course discussion board. Courses hold named
//!   threads; each thread opens with a welcome message.
//! - [`TeacherSession`]: a list of numbered chats (`Chat 1`, `Chat 2`, …),
//!   each opened with a greeting.
//!
//! Both are plain owned values. The HTTP server keeps one of each behind a
//! mutex and hands references to its handlers; nothing here is global.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Greeting that opens every teacher chat.
pub const CHAT_GREETING: &str = "Hello, I'm ChatGPT. How can I help you today?";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown course: {0}")]
    UnknownCourse(String),
    #[error("unknown thread '{thread}' in course '{course}'")]
    UnknownThread { course: String, thread: String },
    #[error("unknown chat: {0}")]
    UnknownChat(String),
    #[error("Please enter a unique thread title.")]
    InvalidThreadTitle,
    #[error("message must not be empty")]
    EmptyMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

fn push_message(messages: &mut Vec<Message>, role: Role, content: &str) -> Result<Message, SessionError> {
    if content.trim().is_empty() {
        return Err(SessionError::EmptyMessage);
    }
    let message = Message::new(role, content);
    messages.push(message.clone());
    Ok(message)
}

// ============ Student ============

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub title: String,
    pub messages: Vec<Message>,
}

impl Thread {
    fn opened_with(title: &str, welcome: String) -> Self {
        Self {
            title: title.to_string(),
            messages: vec![Message::new(Role::Assistant, welcome)],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub name: String,
    pub threads: Vec<Thread>,
}

impl Course {
    fn with_threads(name: &str, titles: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            threads: titles
                .iter()
                .map(|t| Thread::opened_with(t, format!("Welcome to {} {}!", name, t)))
                .collect(),
        }
    }
}

/// Course discussion state with a current course/thread selection.
#[derive(Debug, Clone, Serialize)]
pub struct StudentSession {
    courses: Vec<Course>,
    current_course: String,
    current_thread: String,
}

impl Default for StudentSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StudentSession {
    /// `Math 101` (General Discussion, Homework Help) and `History 202`
    /// (General Discussion), with the first thread of the first course selected.
    pub fn new() -> Self {
        Self {
            courses: vec![
                Course::with_threads("Math 101", &["General Discussion", "Homework Help"]),
                Course::with_threads("History 202", &["General Discussion"]),
            ],
            current_course: "Math 101".to_string(),
            current_thread: "General Discussion".to_string(),
        }
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// Currently selected `(course, thread)`.
    pub fn current(&self) -> (&str, &str) {
        (&self.current_course, &self.current_thread)
    }

    pub fn course(&self, name: &str) -> Result<&Course, SessionError> {
        self.courses
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SessionError::UnknownCourse(name.to_string()))
    }

    fn course_mut(&mut self, name: &str) -> Result<&mut Course, SessionError> {
        self.courses
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SessionError::UnknownCourse(name.to_string()))
    }

    pub fn thread(&self, course: &str, title: &str) -> Result<&Thread, SessionError> {
        self.course(course)?
            .threads
            .iter()
            .find(|t| t.title == title)
            .ok_or_else(|| SessionError::UnknownThread {
                course: course.to_string(),
                thread: title.to_string(),
            })
    }

    fn thread_mut(&mut self, course: &str, title: &str) -> Result<&mut Thread, SessionError> {
        self.course_mut(course)?
            .threads
            .iter_mut()
            .find(|t| t.title == title)
            .ok_or_else(|| SessionError::UnknownThread {
                course: course.to_string(),
                thread: title.to_string(),
            })
    }

    /// Select a course and one of its threads.
    pub fn select(&mut self, course: &str, thread: &str) -> Result<(), SessionError> {
        self.thread(course, thread)?;
        self.current_course = course.to_string();
        self.current_thread = thread.to_string();
        Ok(())
    }

    /// Open a new thread in `course` and select it.
    ///
    /// Titles are trimmed; an empty title or one already used in the course
    /// is rejected.
    pub fn create_thread(&mut self, course: &str, title: &str) -> Result<&Thread, SessionError> {
        let title = title.trim();
        let target = self.course_mut(course)?;
        if title.is_empty() || target.threads.iter().any(|t| t.title == title) {
            return Err(SessionError::InvalidThreadTitle);
        }
        target
            .threads
            .push(Thread::opened_with(title, format!("Welcome to {}!", title)));

        self.current_course = course.to_string();
        self.current_thread = title.to_string();
        self.thread(course, title)
    }

    /// Append a message to a thread.
    pub fn post(
        &mut self,
        course: &str,
        thread: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, SessionError> {
        push_message(&mut self.thread_mut(course, thread)?.messages, role, content)
    }
}

// ============ Teacher ============

#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub name: String,
    pub messages: Vec<Message>,
}

impl Chat {
    fn opened(name: String) -> Self {
        Self {
            name,
            messages: vec![Message::new(Role::Assistant, CHAT_GREETING)],
        }
    }
}

/// Numbered chat history with a current selection.
#[derive(Debug, Clone, Serialize)]
pub struct TeacherSession {
    chats: Vec<Chat>,
    current: String,
}

impl Default for TeacherSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TeacherSession {
    /// Starts with `Chat 1` selected.
    pub fn new() -> Self {
        Self {
            chats: vec![Chat::opened("Chat 1".to_string())],
            current: "Chat 1".to_string(),
        }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn chat(&self, name: &str) -> Result<&Chat, SessionError> {
        self.chats
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SessionError::UnknownChat(name.to_string()))
    }

    /// Open `Chat {n+1}` and select it.
    pub fn new_chat(&mut self) -> &Chat {
        let mut n = self.chats.len() + 1;
        while self.chats.iter().any(|c| c.name == format!("Chat {}", n)) {
            n += 1;
        }
        let name = format!("Chat {}", n);
        self.current = name.clone();
        self.chats.push(Chat::opened(name));
        &self.chats[self.chats.len() - 1]
    }

    pub fn select(&mut self, name: &str) -> Result<(), SessionError> {
        self.chat(name)?;
        self.current = name.to_string();
        Ok(())
    }

    /// Append a message to a chat.
    pub fn post(&mut self, name: &str, role: Role, content: &str) -> Result<Message, SessionError> {
        let chat = self
            .chats
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SessionError::UnknownChat(name.to_string()))?;
        push_message(&mut chat.messages, role, content)
    }
}
